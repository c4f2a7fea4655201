pub mod converter;

// 重新导出常用类型和函数，方便外部使用
pub use converter::{
    client::{ClientConfig, ConversionOutcome, ConverterClient, RecordDelivery},
    convert, format_result,
    network::{ConnectivityMonitor, ReachabilityProbe},
    record::{ConversionRecord, ConversionSyncer, FlushOutcome},
    sign_in_async, ConvertError, QuantityType, Session, StorageError, SyncError,
};
