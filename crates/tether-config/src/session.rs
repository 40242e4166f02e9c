//! Discrete session options translated into engine settings.

use serde::{Deserialize, Serialize};

use crate::categories::AlertCategories;
use crate::pack::SettingsPack;

/// Encryption policy value that forces encrypted peer connections.
const ENCRYPTION_FORCED: i32 = 0;

/// Categories the alert router depends on; always enabled.
pub const REQUIRED_CATEGORIES: AlertCategories = AlertCategories::STATUS;

/// Options applied when a session is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HTTP user agent announced to trackers and web seeds.
    pub user_agent: Option<String>,
    /// Peer-id fingerprint prefix.
    pub fingerprint: Option<String>,
    /// Hide identifying information from peers and trackers.
    pub private_mode: bool,
    /// Do not open outgoing connections for seeding torrents.
    pub block_seeding: bool,
    /// Only talk to peers over encrypted connections.
    pub force_encryption: bool,
    /// Global connection limit; values below one keep the engine default.
    pub max_connections: i32,
    /// Alert categories to enable in addition to [`REQUIRED_CATEGORIES`].
    pub alert_categories: AlertCategories,
    /// Forward alerts that have no dedicated layout as generic alerts.
    pub include_unmapped_alerts: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            fingerprint: None,
            private_mode: false,
            block_seeding: false,
            force_encryption: false,
            max_connections: 200,
            alert_categories: AlertCategories::ERROR,
            include_unmapped_alerts: false,
        }
    }
}

impl SessionConfig {
    /// Effective alert mask, including the required categories.
    #[must_use]
    pub fn alert_mask(&self) -> AlertCategories {
        self.alert_categories | REQUIRED_CATEGORIES
    }

    /// Engine settings equivalent to this configuration.
    #[must_use]
    pub fn to_settings_pack(&self) -> SettingsPack {
        let mut pack = SettingsPack::new();

        if let Some(agent) = self.user_agent.as_deref().filter(|v| !v.is_empty()) {
            pack.set("user_agent", agent);
        }
        if let Some(fingerprint) = self.fingerprint.as_deref().filter(|v| !v.is_empty()) {
            pack.set("peer_fingerprint", fingerprint);
        }

        pack.set("alert_mask", self.alert_mask().as_setting());
        pack.set("anonymous_mode", self.private_mode);

        if self.block_seeding {
            pack.set("seeding_outgoing_connections", false);
        }
        if self.max_connections > 0 {
            pack.set("connections_limit", self.max_connections);
        }
        if self.force_encryption {
            pack.set("out_enc_policy", ENCRYPTION_FORCED);
            pack.set("in_enc_policy", ENCRYPTION_FORCED);
        }

        pack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_translate_to_minimal_pack() {
        let pack = SessionConfig::default().to_settings_pack();

        assert_eq!(pack.get::<i32>("connections_limit"), Ok(Some(200)));
        assert_eq!(pack.get::<bool>("anonymous_mode"), Ok(Some(false)));
        assert_eq!(pack.get_str("user_agent"), Ok(None));
        assert_eq!(pack.get::<bool>("seeding_outgoing_connections"), Ok(None));
        assert_eq!(
            pack.get::<i32>("alert_mask"),
            Ok(Some((AlertCategories::ERROR | AlertCategories::STATUS).as_setting()))
        );
    }

    #[test]
    fn status_category_cannot_be_disabled() {
        let config = SessionConfig {
            alert_categories: AlertCategories::NONE,
            ..SessionConfig::default()
        };
        assert!(config.alert_mask().contains(AlertCategories::STATUS));
    }

    #[test]
    fn explicit_options_are_applied() {
        let config = SessionConfig {
            user_agent: Some("tether/0.1".into()),
            fingerprint: Some("-TT0100-".into()),
            private_mode: true,
            block_seeding: true,
            force_encryption: true,
            max_connections: 0,
            ..SessionConfig::default()
        };
        let pack = config.to_settings_pack();

        assert_eq!(pack.get_str("user_agent"), Ok(Some("tether/0.1")));
        assert_eq!(pack.get_str("peer_fingerprint"), Ok(Some("-TT0100-")));
        assert_eq!(pack.get::<bool>("anonymous_mode"), Ok(Some(true)));
        assert_eq!(pack.get::<bool>("seeding_outgoing_connections"), Ok(Some(false)));
        assert_eq!(pack.get::<i32>("out_enc_policy"), Ok(Some(0)));
        assert_eq!(pack.get::<i32>("in_enc_policy"), Ok(Some(0)));
        assert_eq!(pack.get::<i32>("connections_limit"), Ok(None));
    }

    #[test]
    fn deserialises_with_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"user_agent":"tether","alert_categories":514}"#)
                .expect("config");
        assert_eq!(config.max_connections, 200);
        assert!(config.alert_categories.contains(AlertCategories::PERFORMANCE_WARNING));
    }
}
