mod aggregate;
mod device;
#[allow(clippy::module_inception)]
mod engine;
pub mod export;
mod ingest;
mod location;
mod message;
mod registry;
pub mod state;
mod weather;

pub use aggregate::Average;
pub use device::DeviceKind;
pub use device::DeviceRecord;
pub use device::DeviceType;
pub use device::device_key;
pub(crate) use device::deserialize_channel;
pub use device::normalize_name;
pub use engine::Engine;
pub use engine::EngineError;
pub use engine::EngineSettings;
pub use engine::TICK_PERIOD;
pub use export::ExportError;
pub use export::Exporter;
pub use export::ServiceDescriptor;
pub use export::ServiceHandle;
pub use export::WriteRequest;
pub use ingest::IngestError;
pub use ingest::IngestOutcome;
pub use location::GpsTracker;
pub use location::Position;
pub use message::BusMessage;
pub use message::WeatherOutcome;
pub use registry::Entry;
pub use registry::Registry;
pub use registry::RegistryError;
pub use state::DeviceSnapshot;
pub use state::State;
pub use weather::Conditions;
pub use weather::WeatherError;
pub use weather::WeatherSource;
