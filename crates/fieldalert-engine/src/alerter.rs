//! Sound and vibration policy.

use std::sync::Arc;

use fieldalert_config::{AlertConfig, VibrationMode};
use fieldalert_core::AlertKind;
use tracing::debug;

use crate::traits::{Actuator, VibrationPattern};

/// Drives the [`Actuator`] according to the per-kind operator preferences.
#[derive(Clone)]
pub struct Alerter {
    actuator: Arc<dyn Actuator>,
    config: Arc<AlertConfig>,
}

impl Alerter {
    pub fn new(actuator: Arc<dyn Actuator>, config: Arc<AlertConfig>) -> Self {
        Self { actuator, config }
    }

    /// Play the kind's sound and vibrate when its vibration mode allows.
    ///
    /// Returns whether the device vibrated.
    pub fn alert(&self, kind: AlertKind) -> bool {
        let settings = self.config.kind(kind);
        self.actuator.play_sound(settings.sound_duration_secs);

        let vibrate = match settings.vibration {
            VibrationMode::Always => true,
            VibrationMode::SoundOffOnly => self.actuator.is_muted(),
            VibrationMode::Never => false,
        };
        if vibrate {
            self.actuator.vibrate(VibrationPattern::Short);
        }

        debug!(
            %kind,
            sound_secs = settings.sound_duration_secs,
            vibrate,
            "re-alert"
        );
        vibrate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockActuator;

    fn alerter(mode: VibrationMode, muted: bool) -> (Alerter, Arc<MockActuator>) {
        let mut config = AlertConfig::default();
        config.sos.vibration = mode;
        config.sos.sound_duration_secs = 7;
        let actuator = Arc::new(MockActuator::new());
        actuator.set_muted(muted);
        (Alerter::new(actuator.clone(), Arc::new(config)), actuator)
    }

    #[test]
    fn test_always_vibrates() {
        let (alerter, actuator) = alerter(VibrationMode::Always, false);
        assert!(alerter.alert(AlertKind::Sos));
        assert_eq!(actuator.sounds(), vec![7]);
        assert_eq!(actuator.vibrations(), 1);
    }

    #[test]
    fn test_sound_off_only_follows_volume() {
        let (alerter, actuator) = alerter(VibrationMode::SoundOffOnly, false);
        assert!(!alerter.alert(AlertKind::Sos));
        assert_eq!(actuator.vibrations(), 0);

        actuator.set_muted(true);
        assert!(alerter.alert(AlertKind::Sos));
        assert_eq!(actuator.vibrations(), 1);
        assert_eq!(actuator.sounds().len(), 2);
    }

    #[test]
    fn test_never_vibrates() {
        let (alerter, actuator) = alerter(VibrationMode::Never, true);
        assert!(!alerter.alert(AlertKind::Sos));
        assert_eq!(actuator.vibrations(), 0);
        assert_eq!(actuator.sounds(), vec![7]);
    }

    #[test]
    fn test_kind_settings_are_independent() {
        let (alerter, actuator) = alerter(VibrationMode::Never, false);
        assert!(alerter.alert(AlertKind::LongStop));
        assert_eq!(actuator.sounds(), vec![5]);
    }
}
