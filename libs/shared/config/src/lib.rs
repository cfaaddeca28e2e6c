use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BOOKING_DATE_COUNT: usize = 14;
pub const DEFAULT_BOOKING_WINDOW_DAYS: u32 = 60;
pub const DEFAULT_CANCELLATION_FEE_PERCENT: u32 = 20;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub port: u16,
    /// How many upcoming dates the booking flow offers per doctor.
    pub booking_date_count: usize,
    /// Calendar days scanned forward from today when collecting dates.
    pub booking_window_days: u32,
    pub cancellation_fee_percent: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            port: DEFAULT_PORT,
            booking_date_count: DEFAULT_BOOKING_DATE_COUNT,
            booking_window_days: DEFAULT_BOOKING_WINDOW_DAYS,
            cancellation_fee_percent: DEFAULT_CANCELLATION_FEE_PERCENT,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            port: parse_or_default("APP_PORT", DEFAULT_PORT),
            booking_date_count: parse_or_default("BOOKING_DATE_COUNT", DEFAULT_BOOKING_DATE_COUNT),
            booking_window_days: parse_or_default("BOOKING_WINDOW_DAYS", DEFAULT_BOOKING_WINDOW_DAYS),
            cancellation_fee_percent: parse_or_default(
                "CANCELLATION_FEE_PERCENT",
                DEFAULT_CANCELLATION_FEE_PERCENT,
            ),
        };

        if config.cancellation_fee_percent > 100 {
            warn!(
                "CANCELLATION_FEE_PERCENT={} is above 100, clamping",
                config.cancellation_fee_percent
            );
        }

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Fee share retained on cancellation, as a fraction in `0.0..=1.0`.
    pub fn cancellation_fee_rate(&self) -> f64 {
        self.cancellation_fee_percent.min(100) as f64 / 100.0
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
