//! Built-in presets for the model providers hosted on Bedrock, and the allow-list
//! that decides which of them appear in the model catalog.
//!
//! Bedrock model ids are namespaced by provider (`anthropic.claude-3-haiku-...`,
//! `meta.llama3-...`). Users name providers in their config and the preset supplies
//! the id prefix; anything else is taken as a raw prefix.

/// Built-in provider presets.
#[derive(Debug, Clone)]
pub struct ProviderPreset {
    pub name: &'static str,
    pub model_prefix: &'static str,
    pub display_name: &'static str,
}

const PRESETS: &[ProviderPreset] = &[
    ProviderPreset {
        name: "anthropic",
        model_prefix: "anthropic.",
        display_name: "Anthropic",
    },
    ProviderPreset {
        name: "amazon",
        model_prefix: "amazon.",
        display_name: "Amazon",
    },
    ProviderPreset {
        name: "meta",
        model_prefix: "meta.",
        display_name: "Meta",
    },
    ProviderPreset {
        name: "mistral",
        model_prefix: "mistral.",
        display_name: "Mistral AI",
    },
    ProviderPreset {
        name: "cohere",
        model_prefix: "cohere.",
        display_name: "Cohere",
    },
    ProviderPreset {
        name: "ai21",
        model_prefix: "ai21.",
        display_name: "AI21 Labs",
    },
    ProviderPreset {
        name: "deepseek",
        model_prefix: "deepseek.",
        display_name: "DeepSeek",
    },
    ProviderPreset {
        name: "writer",
        model_prefix: "writer.",
        display_name: "Writer",
    },
];

impl ProviderPreset {
    #[must_use]
    pub fn from_name(name: &str) -> Option<&'static ProviderPreset> {
        PRESETS.iter().find(|p| p.name == name.to_lowercase())
    }

    /// Preset whose prefix matches the given model id.
    #[must_use]
    pub fn for_model(model_id: &str) -> Option<&'static ProviderPreset> {
        PRESETS.iter().find(|p| model_id.starts_with(p.model_prefix))
    }

    #[must_use]
    pub fn all() -> &'static [ProviderPreset] {
        PRESETS
    }
}

/// Set of model-id prefixes permitted in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderAllowList {
    prefixes: Vec<String>,
}

impl ProviderAllowList {
    /// Build from provider names or raw prefixes.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = entries
            .into_iter()
            .filter_map(|entry| {
                let entry = entry.as_ref().trim();
                if entry.is_empty() {
                    return None;
                }
                Some(
                    ProviderPreset::from_name(entry)
                        .map_or_else(|| entry.to_string(), |p| p.model_prefix.to_string()),
                )
            })
            .collect();

        Self { prefixes }
    }

    #[must_use]
    pub fn allows(&self, model_id: &str) -> bool {
        self.prefixes.iter().any(|p| model_id.starts_with(p.as_str()))
    }

    #[must_use]
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_providers() {
        assert!(ProviderPreset::from_name("anthropic").is_some());
        assert!(ProviderPreset::from_name("Meta").is_some()); // case-insensitive
        assert!(ProviderPreset::from_name("unknown_provider").is_none());
    }

    #[test]
    fn test_presets_prefixes_end_with_dot() {
        for preset in ProviderPreset::all() {
            assert!(
                preset.model_prefix.ends_with('.'),
                "Provider {} prefix should be namespaced",
                preset.name
            );
        }
    }

    #[test]
    fn test_for_model() {
        let preset = ProviderPreset::for_model("anthropic.claude-3-haiku-20240307-v1:0").unwrap();
        assert_eq!(preset.display_name, "Anthropic");
        assert!(ProviderPreset::for_model("stability.sd3-large-v1:0").is_none());
    }

    #[test]
    fn test_allow_list_resolves_names_and_raw_prefixes() {
        let allow = ProviderAllowList::new(["Anthropic", "stability.sd3", " "]);

        assert_eq!(allow.prefixes(), ["anthropic.", "stability.sd3"]);
        assert!(allow.allows("anthropic.claude-3-5-sonnet-20240620-v1:0"));
        assert!(allow.allows("stability.sd3-large-v1:0"));
        assert!(!allow.allows("meta.llama3-8b-instruct-v1:0"));
    }

    #[test]
    fn test_empty_allow_list_allows_nothing() {
        let allow = ProviderAllowList::new(Vec::<String>::new());
        assert!(allow.is_empty());
        assert!(!allow.allows("anthropic.claude-v2"));
    }
}
