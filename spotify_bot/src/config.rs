use clap::builder::NonEmptyStringValueParser;
use clap::Parser;
use convert_client::{ClientConfig, DEFAULT_ENDPOINT, DEFAULT_HOST};
use std::fmt::Debug;
use std::time::Duration;

/// Upper bound for `--max-file-mb`, keeps the byte cap far from overflow.
const MAX_FILE_MB: u64 = 2000;

#[derive(Parser)]
#[clap(
    author = "Alex Markov",
    version = "0.1.0",
    about = "Telegram bot that turns Spotify track links into MP3 files"
)]
pub struct Args {
    #[clap(long, env = "TELEGRAM_TOKEN", hide_env_values = true, value_parser = NonEmptyStringValueParser::new())]
    tg_token: String,
    #[clap(long, env = "DOWNLOAD_API_KEY", hide_env_values = true, value_parser = NonEmptyStringValueParser::new())]
    api_key: String,
    #[clap(long, env = "DOWNLOAD_API_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    api_endpoint: String,
    #[clap(long, env = "DOWNLOAD_API_HOST", default_value = DEFAULT_HOST)]
    api_host: String,
    #[clap(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    convert_timeout_secs: u64,
    #[clap(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    download_timeout_secs: u64,
    #[clap(long, default_value = "120", value_parser = clap::value_parser!(u64).range(1..))]
    upload_timeout_secs: u64,
    #[clap(long, default_value = "50", value_parser = clap::value_parser!(u64).range(1..=MAX_FILE_MB))]
    max_file_mb: u64,
}

impl Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("api_endpoint", &self.api_endpoint)
            .field("api_host", &self.api_host)
            .field("convert_timeout_secs", &self.convert_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("max_file_mb", &self.max_file_mb)
            .finish_non_exhaustive()
    }
}

/// Everything the process needs, loaded once at startup.
pub struct BotConfig {
    pub tg_token: String,
    pub upload_timeout: Duration,
    pub client: ClientConfig,
}

impl Args {
    pub fn into_config(self) -> BotConfig {
        let client = ClientConfig {
            convert_timeout: Duration::from_secs(self.convert_timeout_secs),
            download_timeout: Duration::from_secs(self.download_timeout_secs),
            max_file_size: self.max_file_mb * 1024 * 1024,
            ..ClientConfig::new(self.api_key).with_api(self.api_endpoint, self.api_host)
        };

        BotConfig {
            tg_token: self.tg_token,
            upload_timeout: Duration::from_secs(self.upload_timeout_secs),
            client,
        }
    }
}
