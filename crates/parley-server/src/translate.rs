//! Translation boundary.
//!
//! The router never talks to a provider directly: it calls
//! [`Translator::translate`], which short-circuits same-language pairs,
//! bounds the provider call, and falls back to the original text on any
//! provider failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use parley_shared::constants::AUTO_LANG;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Unsupported language pair {source_lang} -> {target_lang}")]
    Unsupported {
        source_lang: String,
        target_lang: String,
    },

    #[error("Translation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// A pluggable translation engine.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslateError>;
}

/// Reference provider: tags the text with the language pair instead of
/// translating it. Only tag-shaped codes (`en`, `pt-BR`) are accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggingProvider;

fn is_language_tag(lang: &str) -> bool {
    !lang.is_empty()
        && lang.len() <= 35
        && lang.split('-').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric())
        })
}

#[async_trait]
impl TranslationProvider for TaggingProvider {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslateError> {
        if !is_language_tag(source_lang) || !is_language_tag(target_lang) {
            return Err(TranslateError::Unsupported {
                source_lang: source_lang.to_string(),
                target_lang: target_lang.to_string(),
            });
        }
        Ok(format!("[translated {source_lang}->{target_lang}] {text}"))
    }
}

#[derive(Clone)]
pub struct Translator {
    provider: Arc<dyn TranslationProvider>,
    timeout: Duration,
}

impl Translator {
    pub fn new(provider: Arc<dyn TranslationProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> String {
        let source_lang = if source_lang.is_empty() {
            AUTO_LANG
        } else {
            source_lang
        };
        if target_lang.is_empty() || target_lang == source_lang {
            return text.to_string();
        }

        let call = self.provider.translate(text, source_lang, target_lang);
        let result = tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(TranslateError::Timeout(self.timeout)));
        result.unwrap_or_else(|e| {
            warn!(error = %e, source_lang, target_lang, "Translation failed, sending original");
            text.to_string()
        })
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(
            Arc::new(TaggingProvider),
            Duration::from_millis(parley_shared::constants::TRANSLATE_TIMEOUT_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider(AtomicUsize);

    #[async_trait]
    impl TranslationProvider for CountingProvider {
        async fn translate(&self, text: &str, _: &str, _: &str) -> Result<String, TranslateError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_uppercase())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl TranslationProvider for FailingProvider {
        async fn translate(&self, _: &str, s: &str, t: &str) -> Result<String, TranslateError> {
            Err(TranslateError::Unsupported {
                source_lang: s.to_string(),
                target_lang: t.to_string(),
            })
        }
    }

    struct StalledProvider;

    #[async_trait]
    impl TranslationProvider for StalledProvider {
        async fn translate(&self, text: &str, _: &str, _: &str) -> Result<String, TranslateError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(text.to_string())
        }
    }

    #[tokio::test]
    async fn test_tagging_provider() {
        let translator = Translator::default();
        assert_eq!(
            translator.translate("hi", "en", "fr").await,
            "[translated en->fr] hi"
        );
        assert_eq!(
            translator.translate("hi", "", "fr").await,
            "[translated auto->fr] hi"
        );
    }

    #[tokio::test]
    async fn test_tagging_provider_rejects_malformed_tags() {
        let provider = TaggingProvider;
        let err = provider.translate("hi", "en", "f r!").await.unwrap_err();
        assert!(matches!(err, TranslateError::Unsupported { .. }));
        assert!(provider.translate("hi", "pt-BR", "zh-Hant-TW").await.is_ok());

        // The translator falls back to the original text.
        assert_eq!(Translator::default().translate("hi", "en", "f r!").await, "hi");
    }

    #[tokio::test]
    async fn test_same_or_missing_target_skips_provider() {
        let provider = Arc::new(CountingProvider(AtomicUsize::new(0)));
        let translator = Translator::new(provider.clone(), Duration::from_secs(1));

        assert_eq!(translator.translate("hi", "en", "en").await, "hi");
        assert_eq!(translator.translate("hi", "en", "").await, "hi");
        assert_eq!(translator.translate("hi", "", "auto").await, "hi");
        assert_eq!(provider.0.load(Ordering::SeqCst), 0);

        assert_eq!(translator.translate("hi", "en", "de").await, "HI");
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back() {
        let translator = Translator::new(Arc::new(FailingProvider), Duration::from_secs(1));
        assert_eq!(translator.translate("bonjour", "fr", "en").await, "bonjour");
    }

    #[tokio::test]
    async fn test_provider_timeout_falls_back() {
        let translator = Translator::new(Arc::new(StalledProvider), Duration::from_millis(100));
        assert_eq!(translator.translate("hola", "es", "en").await, "hola");
    }
}
