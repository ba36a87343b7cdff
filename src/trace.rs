use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr, stdout carries the
/// exported targets.
pub fn init(color: bool, levels: &str) {
    let filter = EnvFilter::try_new(levels).unwrap_or_else(|err| {
        eprintln!("invalid log level {levels:?}, {err}, fallback to info");

        EnvFilter::new("info")
    });

    // it fails only when a subscriber is installed already, which is fine
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(color)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Expand a bare level into directives for our own crates, a full directive
/// string is used as is.
pub fn directives(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }

    match level {
        "off" => "off".to_string(),
        level => [format!("discoverd={level}"), format!("discovery={level}")].join(","),
    }
}
