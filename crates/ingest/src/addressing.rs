use sentrybot_config::FilterConfig;

/// Raw shape of the bits of an inbound message relevant to addressing
/// detection, independent of the transport's concrete message type so this
/// logic stays testable without a `teloxide::types::Message`.
#[derive(Debug, Clone, Default)]
pub struct AddressingInput<'a> {
    pub text: Option<&'a str>,
    pub is_reply_to_bot: bool,
    pub mentions_bot_username: bool,
}

/// A message is addressed if it replies to the bot, explicitly mentions the
/// bot's username, or fuzzy-matches a configured name variant in its text.
pub fn is_addressed(input: &AddressingInput<'_>, config: &FilterConfig) -> bool {
    if input.is_reply_to_bot || input.mentions_bot_username {
        return true;
    }
    if !config.require_mention {
        return true;
    }
    let Some(text) = input.text else {
        return false;
    };
    let lower = text.to_lowercase();
    config
        .bot_name_variants
        .iter()
        .chain(config.trigger_keywords.iter())
        .any(|variant| lower.contains(&variant.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(require_mention: bool, variants: Vec<&str>) -> FilterConfig {
        FilterConfig {
            require_mention,
            bot_name_variants: variants.into_iter().map(String::from).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn reply_to_bot_is_always_addressed() {
        let input = AddressingInput {
            text: Some("anything"),
            is_reply_to_bot: true,
            mentions_bot_username: false,
        };
        assert!(is_addressed(&input, &config(true, vec!["gryag"])));
    }

    #[test]
    fn name_variant_in_text_is_addressed() {
        let input = AddressingInput {
            text: Some("hey Gryag, what's up"),
            is_reply_to_bot: false,
            mentions_bot_username: false,
        };
        assert!(is_addressed(&input, &config(true, vec!["gryag"])));
    }

    #[test]
    fn unrelated_text_is_not_addressed() {
        let input = AddressingInput {
            text: Some("just chatting about cats"),
            is_reply_to_bot: false,
            mentions_bot_username: false,
        };
        assert!(!is_addressed(&input, &config(true, vec!["gryag"])));
    }

    #[test]
    fn mention_without_require_flag_still_counts() {
        let input = AddressingInput {
            text: Some("anything"),
            is_reply_to_bot: false,
            mentions_bot_username: true,
        };
        assert!(is_addressed(&input, &config(false, vec![])));
    }
}
