use mg_core::MarginaliaError;
use mg_core::MarginaliaResult;
use mg_dom::ScrollBehavior;
use mg_dom::ScrollBlock;
use mg_dom::ScrollOptions;

const DEFAULT_MAX_CLASSES: usize = 4;
const HARD_MAX_CLASSES: usize = 8;

/// Tuning for capture and relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorConfig {
    /// Classes kept per element before subsets are enumerated (2^n subsets).
    pub max_classes: usize,
    /// How a relocated selection is brought into view.
    pub scroll: ScrollOptions,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            max_classes: DEFAULT_MAX_CLASSES,
            scroll: ScrollOptions {
                block: ScrollBlock::Center,
                behavior: ScrollBehavior::Smooth,
            },
        }
    }
}

impl AnchorConfig {
    pub fn validate(&self) -> MarginaliaResult<()> {
        if self.max_classes == 0 {
            return Err(MarginaliaError::new(
                "anchor.config_invalid",
                "max_classes must be greater than zero",
            ));
        }

        if self.max_classes > HARD_MAX_CLASSES {
            return Err(MarginaliaError::new(
                "anchor.config_invalid",
                format!(
                    "max_classes exceeds hard limit ({} > {HARD_MAX_CLASSES})",
                    self.max_classes
                ),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::AnchorConfig;
    use mg_dom::ScrollBlock;

    #[test]
    fn default_config_is_valid_and_centers() {
        let config = AnchorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_classes, 4);
        assert_eq!(config.scroll.block, ScrollBlock::Center);
    }

    #[test]
    fn rejects_out_of_range_class_limits() {
        for max_classes in [0, 9] {
            let config = AnchorConfig {
                max_classes,
                ..AnchorConfig::default()
            };
            let validated = config.validate();
            assert!(validated.is_err());
            if let Err(error) = validated {
                assert_eq!(error.code, "anchor.config_invalid");
            }
        }
    }
}
