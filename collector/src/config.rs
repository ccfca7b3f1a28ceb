use common_kafka::config::KafkaConfig;
use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1")]
    pub host: String,

    #[envconfig(default = "3301")]
    pub port: u16,

    /// Which source this deployment owns: "facebook" or "tiktok". Anything
    /// else leaves the process running with zero subscriptions.
    pub collector_type: Option<String>,

    #[envconfig(default = "10")]
    pub shutdown_grace_secs: u64,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
