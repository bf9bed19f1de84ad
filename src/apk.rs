//! Embedded APK metadata.
//!
//! The direct-URL fetch path learns version name, version code and the
//! permission list from the package itself rather than from any API
//! response. APKs are ZIP archives; the interesting part is
//! `AndroidManifest.xml`, stored in Android's binary XML chunk format:
//! a string pool, a resource-id map, and a flat stream of element chunks
//! whose attributes reference both.

use std::io::Read;

use crate::error::{Error, Result};

#[derive(Debug, Default, Clone)]
pub struct PackageInfo {
    pub version_name: Option<String>,
    pub version_code: Option<i64>,
    pub permissions: Vec<String>,
}

const CHUNK_XML: u16 = 0x0003;
const CHUNK_STRING_POOL: u16 = 0x0001;
const CHUNK_RESOURCE_MAP: u16 = 0x0180;
const CHUNK_START_ELEMENT: u16 = 0x0102;

// Framework attribute resource ids.
const RES_NAME: u32 = 0x0101_0003;
const RES_VERSION_CODE: u32 = 0x0101_021b;
const RES_VERSION_NAME: u32 = 0x0101_021c;

const UTF8_FLAG: u32 = 0x0000_0100;
const NO_RAW_VALUE: u32 = 0xffff_ffff;

const TYPE_STRING: u8 = 0x03;
const TYPE_INT_DEC: u8 = 0x10;
const TYPE_INT_HEX: u8 = 0x11;

// Upper bound on pool entries; anything larger is a corrupt manifest.
const MAX_POOL_STRINGS: usize = 65_536;

/// Extracts version metadata from raw APK bytes.
pub fn read_package_info(apk: &[u8]) -> Result<PackageInfo> {
    let cursor = std::io::Cursor::new(apk);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| Error::Metadata(format!("not an APK archive: {e}")))?;
    let mut manifest = archive
        .by_name("AndroidManifest.xml")
        .map_err(|e| Error::Metadata(format!("AndroidManifest.xml missing: {e}")))?;

    let mut data = Vec::new();
    manifest.read_to_end(&mut data)?;
    parse_manifest(&data)
}

/// Parses a binary `AndroidManifest.xml`.
pub fn parse_manifest(data: &[u8]) -> Result<PackageInfo> {
    let r = Reader { data };
    if r.u16(0)? != CHUNK_XML {
        return Err(Error::Metadata("not a binary XML document".to_string()));
    }
    let header_size = r.u16(2)? as usize;
    let total = (r.u32(4)? as usize).min(data.len());

    let mut strings: Vec<String> = Vec::new();
    let mut resources: Vec<u32> = Vec::new();
    let mut info = PackageInfo::default();

    let mut pos = header_size;
    while pos + 8 <= total {
        let chunk_type = r.u16(pos)?;
        let chunk_size = r.u32(pos + 4)? as usize;
        if chunk_size < 8 || pos + chunk_size > total {
            return Err(Error::Metadata("truncated chunk".to_string()));
        }

        match chunk_type {
            CHUNK_STRING_POOL => strings = parse_string_pool(&r, pos)?,
            CHUNK_RESOURCE_MAP => {
                resources = (8..chunk_size)
                    .step_by(4)
                    .map(|off| r.u32(pos + off))
                    .collect::<Result<Vec<_>>>()?;
            }
            CHUNK_START_ELEMENT => parse_element(&r, pos, &strings, &resources, &mut info)?,
            _ => {}
        }

        pos += chunk_size;
    }

    Ok(info)
}

struct Reader<'a> {
    data: &'a [u8],
}

impl Reader<'_> {
    fn u8(&self, at: usize) -> Result<u8> {
        self.data
            .get(at)
            .copied()
            .ok_or_else(|| Error::Metadata("unexpected end of manifest".to_string()))
    }

    fn u16(&self, at: usize) -> Result<u16> {
        let bytes = self
            .data
            .get(at..at + 2)
            .ok_or_else(|| Error::Metadata("unexpected end of manifest".to_string()))?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&self, at: usize) -> Result<u32> {
        let bytes = self
            .data
            .get(at..at + 4)
            .ok_or_else(|| Error::Metadata("unexpected end of manifest".to_string()))?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

fn parse_string_pool(r: &Reader<'_>, p: usize) -> Result<Vec<String>> {
    let string_count = r.u32(p + 8)? as usize;
    let flags = r.u32(p + 16)?;
    let strings_start = r.u32(p + 20)? as usize;
    let utf8 = flags & UTF8_FLAG != 0;

    if string_count > MAX_POOL_STRINGS {
        return Err(Error::Metadata("oversized string pool".to_string()));
    }

    let mut out = Vec::with_capacity(string_count);
    for i in 0..string_count {
        let offset = r.u32(p + 28 + 4 * i)? as usize;
        let at = p + strings_start + offset;
        out.push(if utf8 {
            read_utf8(r, at)?
        } else {
            read_utf16(r, at)?
        });
    }
    Ok(out)
}

fn read_utf16(r: &Reader<'_>, mut at: usize) -> Result<String> {
    let mut len = r.u16(at)? as usize;
    at += 2;
    if len & 0x8000 != 0 {
        len = ((len & 0x7fff) << 16) | r.u16(at)? as usize;
        at += 2;
    }

    let mut units = Vec::with_capacity(len);
    for i in 0..len {
        units.push(r.u16(at + 2 * i)?);
    }
    Ok(String::from_utf16_lossy(&units))
}

fn read_utf8(r: &Reader<'_>, mut at: usize) -> Result<String> {
    // Character count first (skipped), then byte count; the high bit extends
    // either length to two bytes.
    let c0 = r.u8(at)?;
    at += 1;
    if c0 & 0x80 != 0 {
        at += 1;
    }

    let mut byte_len = r.u8(at)? as usize;
    at += 1;
    if byte_len & 0x80 != 0 {
        byte_len = ((byte_len & 0x7f) << 8) | r.u8(at)? as usize;
        at += 1;
    }

    let bytes = r
        .data
        .get(at..at + byte_len)
        .ok_or_else(|| Error::Metadata("unexpected end of manifest".to_string()))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn parse_element(
    r: &Reader<'_>,
    p: usize,
    strings: &[String],
    resources: &[u32],
    info: &mut PackageInfo,
) -> Result<()> {
    // Element header follows the 16-byte node header: ns, name,
    // attributeStart/Size (relative to here), attributeCount.
    let ext = p + 16;
    let name_idx = r.u32(ext + 4)? as usize;
    let attr_start = r.u16(ext + 8)? as usize;
    let attr_size = r.u16(ext + 10)? as usize;
    let attr_count = r.u16(ext + 12)? as usize;

    let element = strings.get(name_idx).map(String::as_str).unwrap_or("");
    if element != "manifest" && element != "uses-permission" {
        return Ok(());
    }
    if attr_size < 20 {
        return Err(Error::Metadata("malformed attribute table".to_string()));
    }

    for i in 0..attr_count {
        let a = ext + attr_start + i * attr_size;
        let attr_name_idx = r.u32(a + 4)? as usize;
        let raw_value = r.u32(a + 8)?;
        let data_type = r.u8(a + 15)?;
        let value = r.u32(a + 16)?;

        let res_id = resources.get(attr_name_idx).copied();
        let attr_name = strings.get(attr_name_idx).map(String::as_str).unwrap_or("");

        let string_value = if raw_value != NO_RAW_VALUE {
            strings.get(raw_value as usize).cloned()
        } else if data_type == TYPE_STRING {
            strings.get(value as usize).cloned()
        } else {
            None
        };

        match element {
            "manifest" => {
                if res_id == Some(RES_VERSION_CODE) || attr_name == "versionCode" {
                    if matches!(data_type, TYPE_INT_DEC | TYPE_INT_HEX) {
                        info.version_code = Some(i64::from(value));
                    }
                } else if res_id == Some(RES_VERSION_NAME) || attr_name == "versionName" {
                    if string_value.is_some() {
                        info.version_name = string_value;
                    }
                }
            }
            "uses-permission" => {
                if res_id == Some(RES_NAME) || attr_name == "name" {
                    if let Some(permission) = string_value {
                        info.permissions.push(permission);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}
