//! Engine Adapter - 推理引擎实现

mod scripted_engine;

pub use scripted_engine::{DescriptorRecord, EngineProbe, ScriptedEngine, ScriptedEngineConfig};
