use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::UpgradeConfig;
use crate::error::UpgradeError;
use crate::version::Version;

/// Settings and cancellation shared by every file in a batch.
#[derive(Debug, Clone)]
pub struct UpgradeContext {
    pub config: UpgradeConfig,
    pub cancel: CancellationToken,
}

impl UpgradeContext {
    pub fn new(config: UpgradeConfig) -> Self {
        UpgradeContext {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_token(config: UpgradeConfig, cancel: CancellationToken) -> Self {
        UpgradeContext { config, cancel }
    }

    pub fn check_cancelled(&self) -> Result<(), UpgradeError> {
        Self::check_token(&self.cancel)
    }

    pub fn check_token(token: &CancellationToken) -> Result<(), UpgradeError> {
        if token.is_cancelled() {
            Err(UpgradeError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.config.step_delay_ms)
    }

    pub fn timelapse_version(&self) -> Version {
        self.config.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_check_cancelled() {
        let ctx = UpgradeContext::new(Config::default().upgrade);
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancel.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(UpgradeError::Cancelled)));
    }
}
