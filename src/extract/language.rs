//! Language detection capability
//!
//! Codes are compared in ISO 639-1 form where one exists; whatlang reports
//! ISO 639-3, so its answers are mapped down before being returned.

/// Detects the language a text is written in
pub trait LanguageDetector: Send + Sync {
    /// Returns a lowercase ISO 639 code, or None if detection failed
    fn detect(&self, text: &str) -> Option<String>;
}

/// `LanguageDetector` backed by whatlang
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let info = whatlang::detect(text)?;
        let code3 = info.lang().code();
        if !info.is_reliable() {
            tracing::trace!(
                "Low-confidence language guess {} ({:.2})",
                code3,
                info.confidence()
            );
        }
        Some(to_iso639_1(code3).unwrap_or(code3).to_string())
    }
}

/// ISO 639-3 → ISO 639-1 for the languages whatlang recognises
const ISO_639_3_TO_1: &[(&str, &str)] = &[
    ("afr", "af"),
    ("aka", "ak"),
    ("amh", "am"),
    ("ara", "ar"),
    ("aze", "az"),
    ("bel", "be"),
    ("ben", "bn"),
    ("bul", "bg"),
    ("cat", "ca"),
    ("ces", "cs"),
    ("cmn", "zh"),
    ("dan", "da"),
    ("deu", "de"),
    ("ell", "el"),
    ("eng", "en"),
    ("epo", "eo"),
    ("est", "et"),
    ("fin", "fi"),
    ("fra", "fr"),
    ("guj", "gu"),
    ("heb", "he"),
    ("hin", "hi"),
    ("hrv", "hr"),
    ("hun", "hu"),
    ("hye", "hy"),
    ("ind", "id"),
    ("ita", "it"),
    ("jav", "jv"),
    ("jpn", "ja"),
    ("kan", "kn"),
    ("kat", "ka"),
    ("khm", "km"),
    ("kor", "ko"),
    ("lat", "la"),
    ("lav", "lv"),
    ("lit", "lt"),
    ("mal", "ml"),
    ("mar", "mr"),
    ("mkd", "mk"),
    ("mya", "my"),
    ("nep", "ne"),
    ("nld", "nl"),
    ("nob", "nb"),
    ("ori", "or"),
    ("pan", "pa"),
    ("pes", "fa"),
    ("pol", "pl"),
    ("por", "pt"),
    ("ron", "ro"),
    ("rus", "ru"),
    ("sin", "si"),
    ("slk", "sk"),
    ("slv", "sl"),
    ("sna", "sn"),
    ("spa", "es"),
    ("srp", "sr"),
    ("swe", "sv"),
    ("tam", "ta"),
    ("tel", "te"),
    ("tgl", "tl"),
    ("tha", "th"),
    ("tuk", "tk"),
    ("tur", "tr"),
    ("ukr", "uk"),
    ("urd", "ur"),
    ("uzb", "uz"),
    ("vie", "vi"),
    ("yid", "yi"),
    ("zul", "zu"),
];

/// Maps an ISO 639-3 code to its ISO 639-1 equivalent
pub fn to_iso639_1(code: &str) -> Option<&'static str> {
    let code = code.to_ascii_lowercase();
    ISO_639_3_TO_1
        .iter()
        .find(|(three, _)| *three == code)
        .map(|(_, two)| *two)
}

/// Compares two language codes, accepting either ISO 639-1 or 639-3 form
pub fn same_language(a: &str, b: &str) -> bool {
    let canonical = |code: &str| {
        let lowered = code.trim().to_ascii_lowercase();
        to_iso639_1(&lowered)
            .map(str::to_string)
            .unwrap_or(lowered)
    };
    canonical(a) == canonical(b)
}
