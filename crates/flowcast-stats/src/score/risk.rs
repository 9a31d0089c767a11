/// `1 - odds`, clamped to `[0, 1]`. A NaN input is treated as zero odds.
#[must_use]
pub fn risk_from_odds(odds_to_deadline: f64) -> f64 {
    if odds_to_deadline.is_nan() {
        return 1.0;
    }
    (1.0 - odds_to_deadline).clamp(0.0, 1.0)
}

/// Operational risk of an entity.
///
/// With no demands in scope nothing is known, so the risk is maximal
/// whatever the odds say.
#[must_use]
pub fn operational_risk(odds_to_deadline: f64, demands_in_scope: u32) -> f64 {
    if demands_in_scope == 0 {
        return 1.0;
    }
    risk_from_odds(odds_to_deadline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_is_complement_of_odds() {
        assert!((risk_from_odds(0.25) - 0.75).abs() < 1e-12);
        assert!(risk_from_odds(1.0).abs() < f64::EPSILON);
        assert!((risk_from_odds(0.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn risk_is_clamped() {
        assert!(risk_from_odds(1.5).abs() < f64::EPSILON);
        assert!((risk_from_odds(-0.5) - 1.0).abs() < f64::EPSILON);
        assert!((risk_from_odds(f64::NAN) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_scope_is_maximal_risk() {
        assert!((operational_risk(1.0, 0) - 1.0).abs() < f64::EPSILON);
        assert!(operational_risk(1.0, 3).abs() < f64::EPSILON);
    }
}
