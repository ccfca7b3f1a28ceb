use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic

    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32, // Size of the in-memory producer queue in mebibytes

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message: 20 seconds

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd

    #[envconfig(default = "5")]
    pub kafka_connect_max_attempts: u32, // Ceiling on broker connection attempts before giving up

    #[envconfig(default = "1000")]
    pub kafka_connect_retry_delay_ms: u64, // Fixed delay between connection attempts

    #[envconfig(default = "1")]
    pub kafka_topic_partitions: i32, // Partition count used when declaring missing topics

    // We default to "earliest" so freshly-deployed collectors pick up the
    // backlog; set to "latest" when bringing up a brand new consumer group.
    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest
}
