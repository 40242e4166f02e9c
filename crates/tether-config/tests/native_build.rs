use std::sync::Arc;

use tether_config::{
    ListenFlags, ListenInterface, SessionConfig, SettingsError, SettingsPack, ValueKind,
};
use tether_native::stub::StubSetting;
use tether_native::{NativeApi, StubEngine};

fn engine() -> (Arc<StubEngine>, Arc<dyn NativeApi>) {
    let engine = Arc::new(StubEngine::default());
    let api: Arc<dyn NativeApi> = engine.clone();
    (engine, api)
}

#[test]
fn build_applies_every_entry() {
    let (engine, api) = engine();
    let mut pack = SettingsPack::new();
    pack.set("Connections_Limit", 64).set("enable_dht", false);

    let built = pack.build(&api).expect("pack builds");
    let handle = built.get().expect("live handle");
    let session = api.create_session(Some(handle)).expect("session");

    assert_eq!(
        engine.session_setting(session, "connections_limit"),
        Some(StubSetting::Int(64))
    );
    assert_eq!(
        engine.session_setting(session, "enable_dht"),
        Some(StubSetting::Bool(false))
    );

    drop(built);
    assert_eq!(engine.live_settings_packs(), 0);
    api.destroy_session(session);
}

#[test]
fn unknown_key_fails_and_releases_native_object() {
    let (engine, api) = engine();
    let mut pack = SettingsPack::new();
    pack.set("connections_limit", 10).set("definitely_not_a_key", true);

    let err = pack.build(&api).expect_err("unknown key is rejected");

    assert_eq!(
        err,
        SettingsError::Rejected {
            key: "definitely_not_a_key".into(),
            kind: ValueKind::Bool,
        }
    );
    assert_eq!(engine.live_settings_packs(), 0);
    assert_eq!(engine.double_frees(), 0);
}

#[test]
fn mistyped_value_is_rejected() {
    let (engine, api) = engine();
    let mut pack = SettingsPack::new();
    pack.set("user_agent", 7);

    assert!(matches!(
        pack.build(&api),
        Err(SettingsError::Rejected { kind: ValueKind::Int, .. })
    ));
    assert_eq!(engine.live_settings_packs(), 0);
}

#[test]
fn listen_interfaces_render_comma_joined() {
    let mut pack = SettingsPack::new();
    pack.use_listen_interfaces([
        ListenInterface::ip("[::]:6001".parse().expect("addr")),
        ListenInterface::ip_with("127.0.0.1:10001".parse().expect("addr"), ListenFlags::Ssl),
    ]);

    assert_eq!(
        pack.get_str("listen_interfaces"),
        Ok(Some("[::]:6001,127.0.0.1:10001s"))
    );

    let mut untouched = SettingsPack::new();
    untouched.use_listen_interfaces(Vec::new());
    assert!(untouched.is_empty());
}

#[test]
fn session_config_pack_is_accepted_by_engine() {
    let (engine, api) = engine();
    let config = SessionConfig {
        user_agent: Some("tether/0.1".into()),
        force_encryption: true,
        block_seeding: true,
        ..SessionConfig::default()
    };

    let built = config.to_settings_pack().build(&api).expect("pack builds");
    assert!(built.get().is_some());
    drop(built);
    assert_eq!(engine.live_settings_packs(), 0);
}
