use crate::error::{Error, Result};

/// An implementation of a time-decaying value
pub trait Decay {
    /// Calculate value at time `t`
    fn evaluate(&self, t: f32) -> f32;
}

/// v(t) = max(v<sub>i</sub> * r<sup>t</sup>, v<sub>f</sub>)
///
/// The discrete form of this is multiplying by `r` at every step and clamping
/// at the floor `v`<sub>f</sub>
#[derive(Debug, Clone, PartialEq)]
pub struct Multiplicative {
    rate: f32,
    vi: f32,
    vf: f32,
}

impl Multiplicative {
    /// **Errors** unless `0 < rate <= 1` and `vf <= vi`
    pub fn new(rate: f32, vi: f32, vf: f32) -> Result<Self> {
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "decay rate is {rate}, must be in the interval (0, 1]"
            )));
        }
        if vf > vi {
            return Err(Error::InvalidConfig(format!(
                "decay floor {vf} is above the initial value {vi}"
            )));
        }
        Ok(Self { rate, vi, vf })
    }
}

impl Decay for Multiplicative {
    fn evaluate(&self, t: f32) -> f32 {
        let &Self { rate, vi, vf } = self;
        (vi * rate.powf(t)).max(vf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplicative_decay() {
        let x = Multiplicative::new(0.5, 2.0, 0.3).unwrap();
        assert_eq!(x.evaluate(0.0), 2.0);
        assert_eq!(x.evaluate(1.0), 1.0);
        assert_eq!(x.evaluate(2.0), 0.5);
        assert_eq!(x.evaluate(3.0), 0.3, "clamped at the floor");
    }

    #[test]
    fn multiplicative_validation() {
        assert!(Multiplicative::new(0.95, 0.9, 0.1).is_ok());
        assert!(Multiplicative::new(1.0, 0.5, 0.5).is_ok());
        assert!(Multiplicative::new(0.0, 0.9, 0.1).is_err());
        assert!(Multiplicative::new(1.5, 0.9, 0.1).is_err());
        assert!(Multiplicative::new(0.9, 0.1, 0.9).is_err());
    }
}
