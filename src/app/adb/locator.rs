use std::path::Path;

use crate::app::error::AppError;

pub const DEFAULT_ADB: &str = "adb";
pub const DEFAULT_EMULATOR: &str = "emulator";

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|candidate| candidate.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

fn resolve_program(config_command_path: &str, fallback: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if normalized.is_empty() {
        fallback.to_string()
    } else {
        normalized
    }
}

pub fn resolve_adb_program(config_command_path: &str) -> String {
    resolve_program(config_command_path, DEFAULT_ADB)
}

/// Falls back to the `emulator` binary that ships next to `platform-tools`
/// when the adb path is absolute and no explicit emulator path is configured.
pub fn resolve_emulator_program(config_command_path: &str, adb_program: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if !normalized.is_empty() {
        return normalized;
    }
    let adb_path = Path::new(adb_program);
    let sibling = adb_path
        .parent()
        .and_then(|platform_tools| platform_tools.parent())
        .map(|sdk| sdk.join(DEFAULT_EMULATOR).join(DEFAULT_EMULATOR));
    match sibling {
        Some(candidate) if adb_path.is_absolute() && candidate.is_file() => {
            candidate.to_string_lossy().to_string()
        }
        _ => DEFAULT_EMULATOR.to_string(),
    }
}

/// Bare program names are left to `PATH` lookup at spawn time.
pub fn validate_adb_program(program: &str, trace_id: &str) -> Result<(), AppError> {
    if program.trim().is_empty() {
        return Err(AppError::validation("ADB command is empty", trace_id));
    }
    if program == DEFAULT_ADB {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err(AppError::validation(
            "ADB path must point to an executable file",
            trace_id,
        ));
    }
    if !path.exists() {
        return Err(AppError::dependency(
            "ADB executable not found at the configured path",
            trace_id,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wrapping_quotes() {
        assert_eq!(
            normalize_command_path("  \"/opt/android/platform-tools/adb\"  "),
            "/opt/android/platform-tools/adb"
        );
        assert_eq!(
            normalize_command_path("  '/opt/android/platform-tools/adb'  "),
            "/opt/android/platform-tools/adb"
        );
    }

    #[test]
    fn resolves_empty_to_default_adb() {
        assert_eq!(resolve_adb_program(""), "adb");
        assert_eq!(resolve_adb_program("   "), "adb");
    }

    #[test]
    fn emulator_prefers_explicit_path() {
        assert_eq!(
            resolve_emulator_program("/sdk/emulator/emulator", "adb"),
            "/sdk/emulator/emulator"
        );
        assert_eq!(resolve_emulator_program("", "adb"), "emulator");
    }

    #[test]
    fn emulator_uses_sdk_sibling_when_present() {
        let sdk = tempfile::tempdir().expect("tempdir");
        let platform_tools = sdk.path().join("platform-tools");
        let emulator_dir = sdk.path().join("emulator");
        std::fs::create_dir_all(&platform_tools).expect("mkdir");
        std::fs::create_dir_all(&emulator_dir).expect("mkdir");
        std::fs::write(emulator_dir.join("emulator"), b"").expect("write");
        let adb = platform_tools.join("adb");

        let resolved = resolve_emulator_program("", &adb.to_string_lossy());
        assert_eq!(resolved, emulator_dir.join("emulator").to_string_lossy());
    }

    #[test]
    fn validates_nonexistent_path() {
        let err = validate_adb_program("/this/path/should/not/exist/adb", "t").unwrap_err();
        assert_eq!(err.code, "ERR_DEPENDENCY");
        assert!(err.error.to_lowercase().contains("not found"));
        assert!(validate_adb_program("adb", "t").is_ok());
        assert_eq!(validate_adb_program(" ", "t").unwrap_err().code, "ERR_VALIDATION");
    }
}
