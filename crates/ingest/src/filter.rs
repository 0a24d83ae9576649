use sentrybot_config::{ChatMode, FilterConfig};

/// Chat-level gate: whitelist/blacklist checks are silent drops, never a
/// reply, so callers should simply discard the update when this returns
/// `false`. Private chats with an admin user bypass the configured mode.
pub fn chat_allowed(config: &FilterConfig, chat_id: i64, is_private: bool, user_is_admin: bool) -> bool {
    if is_private && user_is_admin {
        return true;
    }
    match config.chat_mode {
        ChatMode::Global => true,
        ChatMode::Whitelist => config.whitelist_chat_ids.contains(&chat_id),
        ChatMode::Blacklist => !config.blacklist_chat_ids.contains(&chat_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_mode_allows_everything() {
        let config = FilterConfig::default();
        assert!(chat_allowed(&config, 42, false, false));
    }

    #[test]
    fn whitelist_mode_rejects_unlisted_chats() {
        let config = FilterConfig {
            chat_mode: ChatMode::Whitelist,
            whitelist_chat_ids: vec![1, 2],
            ..Default::default()
        };
        assert!(chat_allowed(&config, 1, false, false));
        assert!(!chat_allowed(&config, 3, false, false));
    }

    #[test]
    fn blacklist_mode_rejects_listed_chats() {
        let config = FilterConfig {
            chat_mode: ChatMode::Blacklist,
            blacklist_chat_ids: vec![9],
            ..Default::default()
        };
        assert!(!chat_allowed(&config, 9, false, false));
        assert!(chat_allowed(&config, 10, false, false));
    }

    #[test]
    fn private_chat_with_admin_always_allowed() {
        let config = FilterConfig {
            chat_mode: ChatMode::Blacklist,
            blacklist_chat_ids: vec![9],
            ..Default::default()
        };
        assert!(chat_allowed(&config, 9, true, true));
    }
}
