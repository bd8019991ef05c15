//! Self-hosted XTT server; credential optional

use super::ServerProfile;

pub(super) static PROFILE: ServerProfile = ServerProfile {
    name: "xtt",
    label: "XTT",
    default_url: "http://localhost:8080",
    default_voice: "default",
    voices: &["default", "female", "male", "robotic", "natural", "expressive"],
    key_required: false,
};

#[cfg(test)]
mod tests {
    use crate::voice::{ServerVoiceProvider, VoiceProvider};

    #[test]
    fn test_voices() {
        let provider = ServerVoiceProvider::xtt();
        assert_eq!(provider.name(), "xtt");
        assert!(provider.get_supported_voices().contains(&"robotic"));
    }
}
