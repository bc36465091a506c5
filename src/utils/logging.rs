use tracing::Level;

/// Install the global fmt subscriber capped at `max_level`.
///
/// Level validation lives in the configuration layer
/// ([`crate::config::settings::LogSettings::max_level`]); this only wires
/// the subscriber up. Safe to call more than once, so tests can set up
/// logging without caring who went first.
pub fn init(max_level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(false)
        .try_init();
}
