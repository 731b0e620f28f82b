use dotenvy::dotenv;
use marketbot_core::config::PipelineSettings;
use marketbot_transport_telegram::config::{BotSettings, TelegramSettings};
use marketbot_transport_telegram::runner::run_bot;
use regex::Regex;
use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Environment variables whose values never appear in logs.
const SECRET_VARS: [&str; 2] = ["TELEGRAM_TOKEN", "BACKEND_API_TOKEN"];

/// Ordered masking rules applied to every log line
struct Redactor {
    rules: Vec<(Regex, String)>,
}

impl Redactor {
    /// Build the rule set: Telegram token shapes, bearer headers, and the
    /// literal values of `secrets`.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    fn new<S: AsRef<str>>(secrets: &[S]) -> Result<Self, regex::Error> {
        let mut rules = vec![
            (
                Regex::new(r"(https?://[^/]+/bot)[0-9]+:[A-Za-z0-9_-]+")?,
                "${1}[TELEGRAM_TOKEN]".to_string(),
            ),
            (
                Regex::new(r"[0-9]{8,10}:[A-Za-z0-9_-]{35}")?,
                "[TELEGRAM_TOKEN]".to_string(),
            ),
            (
                Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9._~+/=-]+")?,
                "${1}[MASKED]".to_string(),
            ),
        ];

        let literals = secrets
            .iter()
            .map(AsRef::as_ref)
            .filter(|s: &&str| !s.is_empty());
        for secret in literals {
            rules.push((Regex::new(&regex::escape(secret))?, "[MASKED]".to_string()));
        }

        Ok(Self { rules })
    }

    /// Rules plus the secret values currently set in the environment.
    fn from_env() -> Result<Self, regex::Error> {
        let secrets: Vec<String> = SECRET_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .collect();
        Self::new(secrets.as_slice())
    }

    fn redact<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut text = Cow::Borrowed(input);
        for (pattern, replacement) in &self.rules {
            if pattern.is_match(&text) {
                let masked = pattern.replace_all(&text, replacement.as_str()).into_owned();
                text = Cow::Owned(masked);
            }
        }
        text
    }
}

/// Writes through to `inner` after masking
struct Redacted<W> {
    inner: W,
    redactor: Arc<Redactor>,
}

impl<W: Write> Write for Redacted<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.inner.write_all(self.redactor.redact(&text).as_bytes())?;
        // Callers track progress against the unmasked length
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Stderr sink for the fmt layer
struct RedactedStderr(Arc<Redactor>);

impl<'a> MakeWriter<'a> for RedactedStderr {
    type Writer = Redacted<io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        Redacted {
            inner: io::stderr(),
            redactor: Arc::clone(&self.0),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Secrets are read before the first log line is written
    let redactor = Redactor::from_env().map_err(|e| {
        eprintln!("Failed to compile redaction patterns: {e}");
        e
    })?;

    init_logging(Arc::new(redactor));

    info!("Starting Marketbot TG Bot...");

    let settings = init_settings();

    if let Err(e) = run_bot(settings).await {
        error!("Bot stopped with error: {:#}", e);
        return Err(e.into());
    }

    Ok(())
}

fn init_logging(redactor: Arc<Redactor>) {
    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "marketbot_core=info,marketbot_transport_telegram=info,hyper=warn,h2=error,\
                 reqwest=warn,tokio=warn,teloxide=info",
            )
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(RedactedStderr(redactor)))
        .init();
}

fn init_settings() -> Arc<BotSettings> {
    let pipeline_settings = match PipelineSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load pipeline configuration: {}", e);
            std::process::exit(1);
        }
    };
    let telegram_settings = match TelegramSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load telegram configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        window_secs = pipeline_settings.rate_limit_window_secs,
        max_requests = pipeline_settings.rate_limit_max_requests,
        "Configuration loaded successfully."
    );
    Arc::new(BotSettings::new(pipeline_settings, telegram_settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redactor(secrets: &[&str]) -> Result<Redactor, regex::Error> {
        Redactor::new(secrets)
    }

    #[test]
    fn test_redacts_telegram_token_in_url() -> Result<(), regex::Error> {
        let redactor = redactor(&[])?;
        let line = concat!(
            "GET https://api.telegram.org/",
            "bot123456789:AAAbbbCCCdddEEEfffGGGhhhIIIjjjKKKlll/getMe"
        );

        let redacted = redactor.redact(line);
        assert_eq!(
            redacted,
            "GET https://api.telegram.org/bot[TELEGRAM_TOKEN]/getMe"
        );
        Ok(())
    }

    #[test]
    fn test_redacts_bearer_and_literal_secrets() -> Result<(), regex::Error> {
        let redactor = redactor(&["s3cr3t-backend", ""])?;

        assert_eq!(
            redactor.redact("authorization: Bearer abc.def"),
            "authorization: Bearer [MASKED]"
        );
        assert_eq!(
            redactor.redact("token=s3cr3t-backend rejected"),
            "token=[MASKED] rejected"
        );
        Ok(())
    }

    #[test]
    fn test_clean_text_is_not_copied() -> Result<(), regex::Error> {
        let redactor = redactor(&["s3cr3t"])?;
        assert!(matches!(
            redactor.redact("rate limited identity=42"),
            Cow::Borrowed(_)
        ));
        Ok(())
    }

    #[test]
    fn test_writer_reports_original_length() -> Result<(), Box<dyn std::error::Error>> {
        let mut writer = Redacted {
            inner: Vec::new(),
            redactor: Arc::new(redactor(&["s3cr3t"])?),
        };

        let written = writer.write(b"key s3cr3t")?;

        assert_eq!(written, 10);
        assert_eq!(writer.inner, b"key [MASKED]");
        Ok(())
    }
}
