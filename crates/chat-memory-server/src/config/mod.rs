pub mod settings;

pub use settings::{
    CapacityPolicy, ChatConfig, GeneratorConfig, LogFormat, LoggingConfig, MemoryConfig,
    ServerConfig, Settings,
};
