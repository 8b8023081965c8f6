//! Sidecar files written next to an exported data file: `.cpg` holds the
//! code page as ASCII decimal text, `.prj` the projection as WKT.

use std::fs;
use std::path::{Path, PathBuf};

use encoding_rs::{
    Encoding, BIG5, EUC_KR, GBK, IBM866, KOI8_R, SHIFT_JIS, UTF_8, WINDOWS_1250, WINDOWS_1251,
    WINDOWS_1252, WINDOWS_1253, WINDOWS_1254, WINDOWS_1255, WINDOWS_1256, WINDOWS_1257,
    WINDOWS_1258, WINDOWS_874,
};

use crate::infra::export::ExportError;

pub const UTF8_CODE_PAGE: u32 = 65001;

/// Encoding for a Windows code page number, if one is supported.
pub fn encoding_for_code_page(code_page: u32) -> Option<&'static Encoding> {
    let encoding = match code_page {
        UTF8_CODE_PAGE => UTF_8,
        866 => IBM866,
        874 => WINDOWS_874,
        932 => SHIFT_JIS,
        936 => GBK,
        949 => EUC_KR,
        950 => BIG5,
        1250 => WINDOWS_1250,
        1251 => WINDOWS_1251,
        1252 => WINDOWS_1252,
        1253 => WINDOWS_1253,
        1254 => WINDOWS_1254,
        1255 => WINDOWS_1255,
        1256 => WINDOWS_1256,
        1257 => WINDOWS_1257,
        1258 => WINDOWS_1258,
        20866 => KOI8_R,
        _ => return None,
    };
    Some(encoding)
}

pub fn sidecar_path(data_path: &Path, extension: &str) -> PathBuf {
    data_path.with_extension(extension)
}

pub fn write_cpg(data_path: &Path, code_page: u32) -> Result<PathBuf, ExportError> {
    let path = sidecar_path(data_path, "cpg");
    fs::write(&path, code_page.to_string()).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

pub fn write_prj(data_path: &Path, wkt: &str) -> Result<PathBuf, ExportError> {
    let path = sidecar_path(data_path, "prj");
    fs::write(&path, wkt).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

pub fn read_cpg(data_path: &Path) -> Result<Option<u32>, ExportError> {
    let path = sidecar_path(data_path, "cpg");
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    text.trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|_| ExportError::InvalidCodePage(text.trim().to_string()))
}
