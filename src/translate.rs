//! Transcript translation with memoization.
//!
//! Translation is a convenience view over finalized transcript text, so it
//! degrades rather than fails: a message whose translation cannot be
//! fetched falls back to its original text. Results are memoized per
//! `(target, source, text)` triple; identical deltas across turns hit the
//! cache instead of the network.

use crate::error::{ParloError, Result};
use crate::lang::{find_language, split_language_accent};
use crate::transcript::Message;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

/// One-shot text translation between two language-accent pairs.
///
/// Implementations receive full language-accent codes and may ignore the
/// accent part. The cache layer above guarantees the pair differs in base
/// language and the text is non-empty.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String>;
}

type CacheKey = (String, String, String);

/// Memoizing front to a [`Translator`].
///
/// The cache only stores successes, so a failed translation is retried the
/// next time the same text comes around. Concurrent requests for the same
/// key may each hit the backend; the duplicate work is accepted in exchange
/// for never holding the cache lock across an await.
pub struct TranslationCache {
    translator: Arc<dyn Translator>,
    cache: Mutex<HashMap<CacheKey, String>>,
}

impl TranslationCache {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self {
            translator,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Translate one text, falling back to the original on any failure.
    pub async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        match self.try_translate(text, source, target).await {
            Ok(translated) => translated,
            Err(err) => {
                eprintln!("parlo: translation failed: {err}");
                text.to_string()
            }
        }
    }

    /// Fill the `target` translation slot of every message that lacks one.
    ///
    /// Failed items keep their original text as the fallback translation.
    /// Returns an error only when remote translation was attempted and
    /// nothing succeeded.
    pub async fn translate_messages(
        &self,
        messages: &mut [Message],
        source: &str,
        target: &str,
    ) -> Result<()> {
        if same_base_language(source, target) {
            return Ok(());
        }

        let mut attempts = 0usize;
        let mut failures = 0usize;
        for message in messages.iter_mut() {
            if message.translations.contains_key(target) || message.text.trim().is_empty() {
                continue;
            }
            let translated = match self.lookup(&message.text, source, target) {
                Some(hit) => hit,
                None => {
                    attempts += 1;
                    match self.fetch(&message.text, source, target).await {
                        Ok(translated) => translated,
                        Err(err) => {
                            failures += 1;
                            eprintln!("parlo: translation failed: {err}");
                            message.text.clone()
                        }
                    }
                }
            };
            message.translations.insert(target.to_string(), translated);
        }

        if attempts > 0 && failures == attempts {
            return Err(ParloError::Translation {
                message: format!("no messages could be translated to {target}"),
            });
        }
        Ok(())
    }

    async fn try_translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        if text.trim().is_empty() || same_base_language(source, target) {
            return Ok(text.to_string());
        }
        if let Some(hit) = self.lookup(text, source, target) {
            return Ok(hit);
        }
        self.fetch(text, source, target).await
    }

    fn lookup(&self, text: &str, source: &str, target: &str) -> Option<String> {
        let key = (target.to_string(), source.to_string(), text.to_string());
        self.cache.lock().ok()?.get(&key).cloned()
    }

    async fn fetch(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let translated = self.translator.translate(text, source, target).await?;
        let translated = translated.trim().to_string();
        let key = (target.to_string(), source.to_string(), text.to_string());
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, translated.clone());
        }
        Ok(translated)
    }
}

/// True when both codes resolve to the same base language, in which case
/// translation is the identity.
pub fn same_base_language(source: &str, target: &str) -> bool {
    split_language_accent(source).0 == split_language_accent(target).0
}

/// Human-readable language name for prompts: `"english-us"` becomes
/// `"English"`. Unknown codes pass through unchanged.
pub fn display_language(code: &str) -> &str {
    let (base, _) = split_language_accent(code);
    find_language(base).map(|option| option.name).unwrap_or(code)
}

// ── Mock translator ──────────────────────────────────────────────────────

/// Mock translator recording call counts for cache assertions.
pub struct MockTranslator {
    calls: std::sync::atomic::AtomicUsize,
    fail: bool,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self {
            calls: std::sync::atomic::AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Make every translation attempt fail.
    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for MockTranslator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str, _source: &str, target: &str) -> Result<String> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail {
            return Err(ParloError::Translation {
                message: "mock translator offline".to_string(),
            });
        }
        Ok(format!("[{target}] {text}"))
    }
}

#[cfg(feature = "http-translate")]
pub use http_impl::HttpTranslator;

#[cfg(feature = "http-translate")]
mod http_impl {
    use super::{Translator, display_language};
    use crate::defaults;
    use crate::error::{ParloError, Result};
    use async_trait::async_trait;
    use serde_json::json;

    const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

    /// Translator backed by a single generateContent request per text.
    pub struct HttpTranslator {
        client: reqwest::Client,
        api_key: String,
        model: String,
    }

    impl HttpTranslator {
        pub fn new(api_key: &str) -> Self {
            Self {
                client: reqwest::Client::new(),
                api_key: api_key.to_string(),
                model: defaults::TRANSLATION_MODEL.to_string(),
            }
        }

        pub fn with_model(mut self, model: &str) -> Self {
            self.model = model.to_string();
            self
        }

        fn prompt(text: &str, source: &str, target: &str) -> String {
            format!(
                "Translate the following text from {source} to {target}. \
                 Provide ONLY the raw translated text, without any additional \
                 explanations, formatting, or quotation marks.\n\n\
                 Text: \"{text}\"\n\nTranslation:"
            )
        }
    }

    #[async_trait]
    impl Translator for HttpTranslator {
        async fn translate(
            &self,
            text: &str,
            source_language: &str,
            target_language: &str,
        ) -> Result<String> {
            let prompt = Self::prompt(
                text,
                display_language(source_language),
                display_language(target_language),
            );
            let url = format!(
                "{API_BASE}/{}:generateContent?key={}",
                self.model, self.api_key
            );
            let body = json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            });

            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|err| ParloError::Translation {
                    message: format!("request failed: {err}"),
                })?;
            if !response.status().is_success() {
                return Err(ParloError::Translation {
                    message: format!("service returned {}", response.status()),
                });
            }

            let value: serde_json::Value =
                response.json().await.map_err(|err| ParloError::Translation {
                    message: format!("unreadable response: {err}"),
                })?;
            let translated = value["candidates"][0]["content"]["parts"][0]["text"]
                .as_str()
                .ok_or_else(|| ParloError::Translation {
                    message: "response carried no text".to_string(),
                })?;
            Ok(translated.trim().to_string())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_prompt_shape() {
            let prompt = HttpTranslator::prompt("hola", "Spanish", "English");
            assert!(prompt.starts_with("Translate the following text from Spanish to English."));
            assert!(prompt.contains("Text: \"hola\""));
            assert!(prompt.ends_with("Translation:"));
        }
    }
}
