//! `ChatterAI` hosted TTS

use super::ServerProfile;

pub(super) static PROFILE: ServerProfile = ServerProfile {
    name: "chatterai",
    label: "ChatterAI",
    default_url: "https://api.chatterai.com",
    default_voice: "natural",
    voices: &[
        "natural",
        "expressive",
        "calm",
        "energetic",
        "professional",
        "friendly",
    ],
    key_required: true,
};
