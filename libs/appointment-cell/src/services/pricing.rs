use tracing::debug;

use shared_config::AppConfig;

use crate::models::CancellationOutcome;

/// Splits a consultation fee on cancellation into the retained company fee
/// and the patient refund.
#[derive(Debug, Clone, Copy)]
pub struct CancellationPolicy {
    fee_rate: f64,
}

impl CancellationPolicy {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_rate(config.cancellation_fee_rate())
    }

    pub fn with_rate(fee_rate: f64) -> Self {
        Self {
            fee_rate: fee_rate.clamp(0.0, 1.0),
        }
    }

    pub fn split(&self, consultation_fee: f64) -> CancellationOutcome {
        let company_fee = round_cents(consultation_fee * self.fee_rate);
        // refund is the remainder so the two always add back up to the fee
        let refund_amount = round_cents(consultation_fee - company_fee);

        debug!(
            "Cancellation split for fee {:.2}: company {:.2}, refund {:.2}",
            consultation_fee, company_fee, refund_amount
        );

        CancellationOutcome { company_fee, refund_amount }
    }
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
