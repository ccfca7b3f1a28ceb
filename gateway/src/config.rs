use std::net::SocketAddr;

use common_kafka::config::KafkaConfig;
use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(default = "127.0.0.1:3000")]
    pub address: SocketAddr,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,
}
