//! Filename Builder (C9): `nomad-<country>-<name>-<year>-v<version>.parquet`.

use nomad_core::{Config, NomadError};
use regex::Regex;

/// Cyrillic → Latin transliteration table (lower- and upper-case), ported
/// from the upstream column analyser's filename sanitizer.
const CYRILLIC_TO_LATIN: &[(char, &str)] = &[
    ('а', "a"), ('б', "b"), ('в', "v"), ('г', "g"), ('д', "d"), ('е', "e"), ('ё', "e"),
    ('ж', "zh"), ('з', "z"), ('и', "i"), ('й', "y"), ('к', "k"), ('л', "l"), ('м', "m"),
    ('н', "n"), ('о', "o"), ('п', "p"), ('р', "r"), ('с', "s"), ('т', "t"), ('у', "u"),
    ('ф', "f"), ('х', "kh"), ('ц', "ts"), ('ч', "ch"), ('ш', "sh"), ('щ', "shch"), ('ъ', ""),
    ('ы', "y"), ('ь', ""), ('э', "e"), ('ю', "yu"), ('я', "ya"),
    ('А', "a"), ('Б', "b"), ('В', "v"), ('Г', "g"), ('Д', "d"), ('Е', "e"), ('Ё', "e"),
    ('Ж', "zh"), ('З', "z"), ('И', "i"), ('Й', "y"), ('К', "k"), ('Л', "l"), ('М', "m"),
    ('Н', "n"), ('О', "o"), ('П', "p"), ('Р', "r"), ('С', "s"), ('Т', "t"), ('У', "u"),
    ('Ф', "f"), ('Х', "kh"), ('Ц', "ts"), ('Ч', "ch"), ('Ш', "sh"), ('Щ', "shch"), ('Ъ', ""),
    ('Ы', "y"), ('Ь', ""), ('Э', "e"), ('Ю', "yu"), ('Я', "ya"),
];

fn transliterate(text: &str) -> String {
    text.chars()
        .map(|c| CYRILLIC_TO_LATIN.iter().find(|(k, _)| *k == c).map(|(_, v)| *v).unwrap_or(&c.to_string()).to_string())
        .collect()
}

/// Mirrors the upstream `sanitize_basename`: transliterate, lowercase,
/// collapse everything outside `[a-z0-9_-]` to a single underscore, trim.
pub fn sanitize_basename(basename: &str) -> String {
    let illegal = Regex::new(r"[^a-z0-9_-]+").unwrap();
    let repeated_underscore = Regex::new(r"_+").unwrap();

    let mut name = transliterate(basename).to_lowercase();
    name = name.replace('.', "_").replace(',', "_").replace(' ', "_");
    name = illegal.replace_all(&name, "_").into_owned();
    name = repeated_underscore.replace_all(&name, "_").into_owned();
    let trimmed = name.trim_matches(|c| c == '_' || c == '-');
    if trimmed.is_empty() {
        "data".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Builds `nomad-<country>-<basename>_<ext>-<year>-v<version>.parquet` from
/// the original input filename.
pub fn build(config: &Config, country_code: &str, original_filename: &str, year: i32, version: u32) -> Result<String, NomadError> {
    if !config.is_country_allowed(country_code) {
        return Err(NomadError::InvalidCountry(country_code.to_string()));
    }
    let path = std::path::Path::new(original_filename);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("data");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");

    let safe_stem = sanitize_basename(stem);
    let middle = if ext.is_empty() {
        safe_stem
    } else {
        format!("{safe_stem}_{}", ext.to_lowercase())
    };

    Ok(format!("nomad-{}-{middle}-{year}-v{version}.parquet", country_code.to_lowercase()))
}

/// Validates a generated filename against `^nomad-[a-z]{2}-[a-z0-9_-]+-\d{4}-v\d+\.parquet$`.
pub fn validate(config: &Config, filename: &str) -> Result<(), NomadError> {
    let pattern = Regex::new(r"^nomad-[a-z]{2}-[a-z0-9_-]+-\d{4}-v\d+\.parquet$").unwrap();
    if !pattern.is_match(filename) {
        return Err(NomadError::SinkError(format!("filename does not match nomad naming convention: {filename}")));
    }
    let country_code = filename.split('-').nth(1).unwrap_or("");
    if !config.is_country_allowed(country_code) {
        return Err(NomadError::InvalidCountry(country_code.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_cyrillic_and_punctuation() {
        let name = sanitize_basename("Отчёт, Январь 2024.csv");
        assert_eq!(name, "otchet_yanvar_2024_csv");
    }

    #[test]
    fn builds_expected_filename() {
        let config = Config::default();
        let name = build(&config, "ru", "клиенты.csv", 2024, 1).unwrap();
        assert_eq!(name, "nomad-ru-klienty_csv-2024-v1.parquet");
    }

    #[test]
    fn rejects_disallowed_country_code() {
        let config = Config::default();
        let err = build(&config, "zz", "data.csv", 2024, 1).unwrap_err();
        assert!(matches!(err, NomadError::InvalidCountry(_)));
    }

    #[test]
    fn validates_well_formed_name() {
        let config = Config::default();
        assert!(validate(&config, "nomad-ru-clients_csv-2024-v1.parquet").is_ok());
        assert!(validate(&config, "clients.parquet").is_err());
    }
}
