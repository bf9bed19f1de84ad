use std::collections::BTreeMap;

use crate::types::SplitArtifact;

/// CPU architecture variants of native-library splits. Only these types are
/// subject to largest-variant selection; everything else (locale, density)
/// is deduplicated strictly by type name at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Abi {
    Arm64V8a,
    ArmeabiV7a,
    Armeabi,
    X86_64,
    X86,
}

impl Abi {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arm64V8a => "arm64-v8a",
            Self::ArmeabiV7a => "armeabi-v7a",
            Self::Armeabi => "armeabi",
            Self::X86_64 => "x86_64",
            Self::X86 => "x86",
        }
    }

    /// Parses an ABI token. Store-delivered split names carry underscores
    /// ("arm64_v8a"); canonical ABI names carry hyphens.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "arm64_v8a" | "arm64-v8a" => Some(Self::Arm64V8a),
            "armeabi_v7a" | "armeabi-v7a" => Some(Self::ArmeabiV7a),
            "armeabi" => Some(Self::Armeabi),
            "x86_64" => Some(Self::X86_64),
            "x86" => Some(Self::X86),
            _ => None,
        }
    }
}

/// Filename-derived split type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitKind {
    Abi(Abi),
    Config(String),
}

/// Classifies a store-delivered split name ("config.arm64_v8a", "config.en",
/// "config.xxhdpi") by its last token.
#[must_use]
pub fn classify(split_name: &str) -> SplitKind {
    let token = split_name.rsplit('.').next().unwrap_or(split_name);
    match Abi::parse(token) {
        Some(abi) => SplitKind::Abi(abi),
        None => SplitKind::Config(token.to_string()),
    }
}

/// Synthetic storage name for a split. ABI-classed splits get the declared
/// byte size appended so size variants keep distinct identities; all other
/// types dedupe by name alone.
#[must_use]
pub fn synthetic_name(split_name: &str, size: i64) -> String {
    match classify(split_name) {
        SplitKind::Abi(_) => format!("{split_name}.{size}"),
        SplitKind::Config(_) => split_name.to_string(),
    }
}

/// Recovers the split type token from a stored synthetic name, tolerating the
/// trailing size suffix on ABI-classed names.
fn stored_type_token(name: &str) -> String {
    let mut segments: Vec<&str> = name.split('.').collect();
    if segments.len() >= 2
        && segments.last().is_some_and(|s| s.chars().all(|c| c.is_ascii_digit()))
        && Abi::parse(segments[segments.len() - 2]).is_some()
    {
        segments.pop();
    }
    let token = segments.last().copied().unwrap_or(name);
    match Abi::parse(token) {
        Some(abi) => abi.as_str().to_string(),
        None => token.to_string(),
    }
}

/// Resolves the splits collected for one artifact record across all devices
/// to exactly one binary per split type. For ABI-classed types the largest
/// size variant wins; picking a smaller one can leave the final bundle
/// missing native libraries on devices that need full extraction.
#[must_use]
pub fn resolve(splits: &[SplitArtifact]) -> Vec<SplitArtifact> {
    let mut best: BTreeMap<String, &SplitArtifact> = BTreeMap::new();

    for split in splits {
        let token = stored_type_token(&split.name);
        match best.get(&token) {
            Some(current) if current.size_bytes >= split.size_bytes => {}
            _ => {
                best.insert(token, split);
            }
        }
    }

    best.into_values().cloned().collect()
}
