//! Language, accent, and voice tables.
//!
//! Plain static configuration data mapping each supported language/accent
//! pair to a prebuilt voice and to the system instruction sent when the
//! session channel is opened. No dynamic dispatch, no I/O.

/// A selectable accent within a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accent {
    pub name: &'static str,
    /// Short accent code, e.g. "us", "uk".
    pub code: &'static str,
    /// Default prebuilt voice for this accent.
    pub voice: &'static str,
}

/// A supported conversation language with its accents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageOption {
    pub name: &'static str,
    /// Language code used in language-accent pairs, e.g. "english".
    pub code: &'static str,
    pub accents: &'static [Accent],
}

/// All prebuilt voices the channel accepts.
pub const AVAILABLE_VOICES: &[&str] = &["Kore", "Zephyr", "Puck", "Charon", "Fenrir"];

/// Supported languages and their accents.
pub const LANGUAGE_OPTIONS: &[LanguageOption] = &[
    LanguageOption {
        name: "English",
        code: "english",
        accents: &[
            Accent {
                name: "American",
                code: "us",
                voice: "Zephyr",
            },
            Accent {
                name: "British",
                code: "uk",
                voice: "Puck",
            },
        ],
    },
    LanguageOption {
        name: "Malay",
        code: "malay",
        accents: &[Accent {
            name: "Standard",
            code: "my",
            voice: "Kore",
        }],
    },
    LanguageOption {
        name: "Spanish",
        code: "spanish",
        accents: &[
            Accent {
                name: "Spain",
                code: "es",
                voice: "Charon",
            },
            Accent {
                name: "Mexican",
                code: "mx",
                voice: "Kore",
            },
        ],
    },
    LanguageOption {
        name: "French",
        code: "french",
        accents: &[
            Accent {
                name: "France",
                code: "fr",
                voice: "Fenrir",
            },
            Accent {
                name: "Canadian",
                code: "ca",
                voice: "Zephyr",
            },
        ],
    },
];

/// Split a language-accent pair like `"english-us"` into `("english", "us")`.
///
/// A bare language code yields an empty accent.
pub fn split_language_accent(code: &str) -> (&str, &str) {
    match code.split_once('-') {
        Some((language, accent)) => (language, accent),
        None => (code, ""),
    }
}

/// Look up a language option by its code.
pub fn find_language(code: &str) -> Option<&'static LanguageOption> {
    LANGUAGE_OPTIONS.iter().find(|l| l.code == code)
}

/// Default voice for a language-accent pair, if the pair is known.
pub fn default_voice(language_accent: &str) -> Option<&'static str> {
    let (language, accent) = split_language_accent(language_accent);
    let option = find_language(language)?;
    option
        .accents
        .iter()
        .find(|a| a.code == accent)
        .map(|a| a.voice)
}

/// Reference document the support agent answers from.
///
/// Appended verbatim to every system instruction so the model grounds its
/// answers in this text instead of inventing order details.
const REFERENCE_DOCUMENT: &str = "\
---
ORDER STATUS REFERENCE

ORDER SUMMARY:
Order number: AB-10293
Placed: 12 August
Item: Aurora wireless headphones, graphite
Status: Shipped, expected delivery within 3-5 business days

RETURNS:
Unopened items may be returned within 30 days of delivery for a full
refund. Opened items may be exchanged within 14 days.

SUPPORT HOURS:
Monday to Friday, 9:00-18:00 local time. Outside these hours, customers
may leave a message and will be called back the next business day.
---
";

/// Base instruction per language. The agent must answer only from the
/// reference document, in the conversation language.
fn base_instruction(language: &str) -> &'static str {
    match language {
        "malay" => {
            "Anda ialah ejen sokongan pelanggan yang mesra dan sedia membantu, \
             menjawab soalan mengenai pesanan pelanggan. Gunakan HANYA maklumat \
             dalam dokumen di bawah. Jika ditanya tentang sesuatu yang tiada \
             dalam dokumen, nyatakan dengan sopan bahawa anda tidak mempunyai \
             maklumat itu. Pastikan jawapan ringkas."
        }
        "spanish" => {
            "Eres un amigable agente de soporte al cliente que responde \
             preguntas sobre el pedido de un cliente. Usa SOLAMENTE la \
             información del documento siguiente. Si te preguntan algo que no \
             está en el documento, indica amablemente que no tienes esa \
             información. Mantén tus respuestas concisas."
        }
        "french" => {
            "Vous êtes un agent de support client amical qui répond aux \
             questions sur la commande d'un client. Utilisez UNIQUEMENT les \
             informations du document ci-dessous. Si la question porte sur un \
             point absent du document, indiquez poliment que vous ne disposez \
             pas de cette information. Restez concis."
        }
        _ => {
            "You are a friendly and helpful customer support agent answering \
             questions about a customer's order. Use ONLY the information \
             provided in the document below. If asked about something not in \
             the document, politely state that you do not have that \
             information. Keep your responses concise and directly related to \
             the user's query."
        }
    }
}

/// Accent-specific addendum, empty for default accents.
fn accent_instruction(language: &str, accent: &str) -> &'static str {
    match (language, accent) {
        ("english", "uk") => {
            "Please use British English spelling and phrasing where \
             appropriate (e.g., 'organisation' instead of 'organization')."
        }
        ("spanish", "es") => "Utiliza el español de España (castellano).",
        ("spanish", "mx") => "Utiliza el español de México.",
        ("french", "fr") => "Utilisez le français de France.",
        ("french", "ca") => {
            "Utilisez le français canadien et les expressions québécoises appropriées."
        }
        _ => "",
    }
}

/// Assemble the full system instruction for a language-accent pair.
pub fn system_instruction(language_accent: &str) -> String {
    let (language, accent) = split_language_accent(language_accent);
    let base = base_instruction(language);
    let extra = accent_instruction(language, accent);
    format!(
        "{} {}\n\nHere is the customer's document:\n{}",
        base, extra, REFERENCE_DOCUMENT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_language_accent() {
        assert_eq!(split_language_accent("english-us"), ("english", "us"));
        assert_eq!(split_language_accent("malay-my"), ("malay", "my"));
        assert_eq!(split_language_accent("english"), ("english", ""));
        assert_eq!(split_language_accent(""), ("", ""));
    }

    #[test]
    fn test_every_accent_voice_is_available() {
        for language in LANGUAGE_OPTIONS {
            for accent in language.accents {
                assert!(
                    AVAILABLE_VOICES.contains(&accent.voice),
                    "{}-{} maps to unknown voice {}",
                    language.code,
                    accent.code,
                    accent.voice
                );
            }
        }
    }

    #[test]
    fn test_default_voice_lookup() {
        assert_eq!(default_voice("english-us"), Some("Zephyr"));
        assert_eq!(default_voice("english-uk"), Some("Puck"));
        assert_eq!(default_voice("malay-my"), Some("Kore"));
        assert_eq!(default_voice("spanish-mx"), Some("Kore"));
        assert_eq!(default_voice("french-ca"), Some("Zephyr"));
    }

    #[test]
    fn test_default_voice_unknown_pair() {
        assert_eq!(default_voice("german-de"), None);
        assert_eq!(default_voice("english-au"), None);
        assert_eq!(default_voice(""), None);
    }

    #[test]
    fn test_find_language() {
        assert!(find_language("english").is_some());
        assert!(find_language("german").is_none());
    }

    #[test]
    fn test_system_instruction_includes_document() {
        let instruction = system_instruction("english-us");
        assert!(instruction.contains("ORDER STATUS REFERENCE"));
        assert!(instruction.contains("customer support agent"));
    }

    #[test]
    fn test_system_instruction_accent_addendum() {
        let uk = system_instruction("english-uk");
        assert!(uk.contains("British English"));

        let us = system_instruction("english-us");
        assert!(!us.contains("British English"));
    }

    #[test]
    fn test_system_instruction_language_selection() {
        assert!(system_instruction("malay-my").contains("ejen sokongan"));
        assert!(system_instruction("spanish-es").contains("castellano"));
        assert!(system_instruction("french-ca").contains("québécoises"));
    }

    #[test]
    fn test_system_instruction_unknown_language_falls_back_to_english() {
        let instruction = system_instruction("german-de");
        assert!(instruction.contains("customer support agent"));
    }
}
