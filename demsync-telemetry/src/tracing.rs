use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Initializes the global tracing subscriber.
///
/// Directives come from `RUST_LOG` when set, otherwise from
/// `default_directives` (e.g. `"demsync=info"`). Safe to call once per
/// process; a second call returns an error instead of panicking, which keeps
/// test binaries that share a process happy.
pub fn init_tracing(default_directives: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directives)),
        )
        .with(fmt::layer())
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_does_not_panic() {
        let first = init_tracing("info");
        let second = init_tracing("info");

        // Whichever call wins the race, the loser must fail gracefully.
        assert!(first.is_ok() || second.is_err());
    }
}
