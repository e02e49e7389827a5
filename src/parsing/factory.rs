//! Language-keyed parser construction, mirroring the teacher's registry shape but
//! scoped to the three supported families.

use std::collections::HashMap;

use crate::config::Settings;
use crate::types::Language;

use super::LanguageParser;

/// Builds fresh [`LanguageParser`] instances for each language enabled in `Settings`.
///
/// Parsers are not `Clone` (tree-sitter parser state is mutable and cheap to recreate),
/// so the factory hands out a new instance per call rather than caching one.
pub struct ParserFactory {
    enabled: HashMap<Language, bool>,
}

impl ParserFactory {
    pub fn from_settings(settings: &Settings) -> Self {
        let mut enabled = HashMap::new();
        enabled.insert(Language::Rust, is_enabled(settings, "rust"));
        enabled.insert(Language::Python, is_enabled(settings, "python"));
        enabled.insert(Language::TypeScript, is_enabled(settings, "typescript"));
        enabled.insert(Language::JavaScript, is_enabled(settings, "typescript"));
        Self { enabled }
    }

    pub fn is_enabled(&self, language: Language) -> bool {
        self.enabled.get(&language).copied().unwrap_or(false)
    }

    pub fn create(&self, language: Language) -> Result<Box<dyn LanguageParser>, String> {
        if !self.is_enabled(language) {
            return Err(format!("{language} is disabled in settings"));
        }
        super::parser_for(language).ok_or_else(|| format!("no parser registered for {language}"))
    }
}

fn is_enabled(settings: &Settings, key: &str) -> bool {
    settings.languages.get(key).map(|c| c.enabled).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_language_is_not_created() {
        let mut settings = Settings::default();
        settings.languages.get_mut("python").unwrap().enabled = false;
        let factory = ParserFactory::from_settings(&settings);
        assert!(factory.create(Language::Python).is_err());
        assert!(factory.create(Language::Rust).is_ok());
    }

    #[test]
    fn typescript_setting_also_gates_javascript() {
        let mut settings = Settings::default();
        settings.languages.get_mut("typescript").unwrap().enabled = false;
        let factory = ParserFactory::from_settings(&settings);
        assert!(factory.create(Language::JavaScript).is_err());
    }
}
