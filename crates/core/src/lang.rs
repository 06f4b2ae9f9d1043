//! Target language table and output file naming.

/// Languages offered as translation targets, with the code used in output file names.
pub const TARGET_LANGUAGES: &[(&str, &str)] = &[
    ("Japanese", "ja"),
    ("Spanish", "es"),
    ("Russian", "ru"),
    ("French", "fr"),
    ("German", "de"),
    ("Chinese (Simplified)", "zh-CN"),
    ("Portuguese (Brazil)", "pt-BR"),
    ("Korean", "ko"),
    ("Italian", "it"),
    ("Vietnamese", "vi"),
    ("Arabic", "ar"),
    ("Hindi", "hi"),
];

/// Code for a language name. Names missing from [`TARGET_LANGUAGES`] fall
/// back to their first two characters, lowercased.
pub fn language_code(language: &str) -> String {
    TARGET_LANGUAGES
        .iter()
        .find(|(name, _)| *name == language)
        .map(|(_, code)| code.to_string())
        .unwrap_or_else(|| language.chars().take(2).collect::<String>().to_lowercase())
}

/// Name of the translated file: `<base>.<code>.srt`, where `<base>` is
/// `original` without its last extension.
pub fn output_file_name(original: &str, language: &str) -> String {
    let base = match original.rfind('.') {
        Some(dot) if dot > 0 => &original[..dot],
        _ => original,
    };
    format!("{}.{}.srt", base, language_code(language))
}

/// Targets the user may pick once the original language is known.
pub fn selectable_targets(original: Option<&str>) -> Vec<&'static str> {
    TARGET_LANGUAGES
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| match original {
            Some(orig) => !same_language(name, orig),
            None => true,
        })
        .collect()
}

/// Whether `target` names the original language. The comparison ignores case
/// and a parenthesized variant, so "Portuguese" matches "Portuguese (Brazil)".
pub fn same_language(target: &str, original: &str) -> bool {
    let original = original.trim();
    if target.eq_ignore_ascii_case(original) {
        return true;
    }
    let bare = target.split(" (").next().unwrap_or(target);
    bare.eq_ignore_ascii_case(original)
}
