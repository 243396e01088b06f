//! Classifier checkpoint loading and export.
//!
//! Two formats are accepted:
//! - JSON parameter mappings `name -> {shape, data}`, either at the top level
//!   or wrapped under `model_state` / `state_dict`. Loading is non-strict:
//!   missing keys keep their initialised values, unknown keys and shape
//!   mismatches are reported and ignored.
//! - Burn `CompactRecorder` files (`.mpk`), loaded strictly.
//!
//! Parameter names follow the module tree, e.g. `conv1.conv.weight`,
//! `conv4.bn.running_var`, `fc2.bias`. Linear weights are stored
//! `[d_input, d_output]`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::{Module, Param, RunningState},
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor, TensorData},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cnn::{ConvBlock, PlantClassifier};
use crate::utils::error::{Result, SeverityError};

/// Keys under which a wrapped checkpoint stores its parameter mapping
pub const STATE_KEYS: [&str; 2] = ["model_state", "state_dict"];

/// Serialized tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorEntry {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorEntry {
    fn from_tensor<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Self> {
        let shape = tensor.dims().to_vec();
        let data = tensor
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| SeverityError::Checkpoint(format!("{:?}", e)))?;
        Ok(Self { shape, data })
    }

    fn is_consistent(&self) -> bool {
        self.shape.iter().product::<usize>() == self.data.len()
    }
}

/// Named parameter mapping
pub type StateDict = BTreeMap<String, TensorEntry>;

/// Where a checkpoint was found and how to read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointSource {
    /// JSON parameter mapping
    Json(PathBuf),
    /// Burn record file; the recorder adds the `.mpk` extension itself
    Record(PathBuf),
}

impl CheckpointSource {
    pub fn path(&self) -> &Path {
        match self {
            CheckpointSource::Json(p) | CheckpointSource::Record(p) => p,
        }
    }
}

/// Locate a checkpoint, trying `<path>.mpk` as well as `path` itself
pub fn resolve_checkpoint_path(path: &Path) -> Option<CheckpointSource> {
    let is_mpk = path.extension().and_then(|e| e.to_str()) == Some("mpk");
    if is_mpk && path.is_file() {
        return Some(CheckpointSource::Record(path.with_extension("")));
    }

    let with_mpk = PathBuf::from(format!("{}.mpk", path.display()));
    if with_mpk.is_file() {
        return Some(CheckpointSource::Record(path.to_path_buf()));
    }

    if path.is_file() {
        return Some(CheckpointSource::Json(path.to_path_buf()));
    }

    None
}

/// Outcome of a non-strict load
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointReport {
    pub path: PathBuf,
    pub loaded: Vec<String>,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    pub mismatched: Vec<String>,
}

impl CheckpointReport {
    /// Every model parameter was found with a matching shape
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }

    pub fn log(&self) {
        info!(
            "Checkpoint {:?}: {} loaded, {} missing, {} unexpected, {} mismatched",
            self.path,
            self.loaded.len(),
            self.missing.len(),
            self.unexpected.len(),
            self.mismatched.len()
        );
        if !self.missing.is_empty() {
            warn!("Missing keys keep initial values: {}", self.missing.join(", "));
        }
        if !self.unexpected.is_empty() {
            warn!("Ignored unexpected keys: {}", self.unexpected.join(", "));
        }
        if !self.mismatched.is_empty() {
            warn!("Ignored keys with mismatched shapes: {}", self.mismatched.join(", "));
        }
    }
}

/// Parse a JSON checkpoint body, unwrapping a recognised state key
pub fn parse_state_dict(json: &str) -> Result<(StateDict, Vec<String>)> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| SeverityError::Checkpoint(format!("invalid JSON: {}", e)))?;

    let serde_json::Value::Object(mut map) = value else {
        return Err(SeverityError::Checkpoint(
            "checkpoint root must be a JSON object".to_string(),
        ));
    };

    for key in STATE_KEYS {
        if matches!(map.get(key), Some(serde_json::Value::Object(_))) {
            if let Some(serde_json::Value::Object(inner)) = map.remove(key) {
                debug!("Unwrapping parameter mapping under '{}'", key);
                map = inner;
            }
            break;
        }
    }

    let mut state = StateDict::new();
    let mut rejected = Vec::new();
    for (name, value) in map {
        match serde_json::from_value::<TensorEntry>(value) {
            Ok(entry) if entry.is_consistent() => {
                state.insert(name, entry);
            }
            Ok(entry) => {
                return Err(SeverityError::Checkpoint(format!(
                    "'{}' declares shape {:?} but holds {} values",
                    name,
                    entry.shape,
                    entry.data.len()
                )));
            }
            Err(_) => rejected.push(name),
        }
    }

    Ok((state, rejected))
}

/// Load a checkpoint into `model`
pub fn load_checkpoint<B: Backend>(
    model: PlantClassifier<B>,
    source: &CheckpointSource,
    device: &B::Device,
) -> Result<(PlantClassifier<B>, CheckpointReport)> {
    match source {
        CheckpointSource::Record(path) => {
            let names = state_dict(&model)?.into_keys().collect();
            let model = model
                .load_file(path, &CompactRecorder::new(), device)
                .map_err(|e| {
                    SeverityError::Checkpoint(format!("Failed to load {:?}: {:?}", path, e))
                })?;
            let report = CheckpointReport {
                path: path.clone(),
                loaded: names,
                ..Default::default()
            };
            Ok((model, report))
        }
        CheckpointSource::Json(path) => {
            let json = fs::read_to_string(path).map_err(|e| {
                SeverityError::Checkpoint(format!("Failed to read {:?}: {}", path, e))
            })?;
            let (state, rejected) = parse_state_dict(&json)?;
            let (model, mut report) = apply_state_dict(model, state, device);
            report.path = path.clone();
            report.unexpected.extend(rejected);
            report.unexpected.sort();
            Ok((model, report))
        }
    }
}

/// Copy matching entries of `state` into `model`
pub fn apply_state_dict<B: Backend>(
    mut model: PlantClassifier<B>,
    state: StateDict,
    device: &B::Device,
) -> (PlantClassifier<B>, CheckpointReport) {
    let mut loader = StateLoader {
        state,
        report: CheckpointReport::default(),
        device,
    };

    model.conv1 = loader.conv_block("conv1", model.conv1);
    model.conv2 = loader.conv_block("conv2", model.conv2);
    model.conv3 = loader.conv_block("conv3", model.conv3);
    model.conv4 = loader.conv_block("conv4", model.conv4);
    model.fc1.weight = loader.param("fc1.weight", model.fc1.weight);
    model.fc1.bias = loader.optional("fc1.bias", model.fc1.bias);
    model.fc2.weight = loader.param("fc2.weight", model.fc2.weight);
    model.fc2.bias = loader.optional("fc2.bias", model.fc2.bias);

    let mut report = loader.report;
    report.unexpected = loader.state.into_keys().collect();
    (model, report)
}

/// Export every parameter of `model`
pub fn state_dict<B: Backend>(model: &PlantClassifier<B>) -> Result<StateDict> {
    let mut state = StateDict::new();

    for (name, block) in [
        ("conv1", &model.conv1),
        ("conv2", &model.conv2),
        ("conv3", &model.conv3),
        ("conv4", &model.conv4),
    ] {
        insert_block(&mut state, name, block)?;
    }

    for (name, linear) in [("fc1", &model.fc1), ("fc2", &model.fc2)] {
        state.insert(
            format!("{}.weight", name),
            TensorEntry::from_tensor(linear.weight.val())?,
        );
        if let Some(bias) = &linear.bias {
            state.insert(format!("{}.bias", name), TensorEntry::from_tensor(bias.val())?);
        }
    }

    Ok(state)
}

fn insert_block<B: Backend>(state: &mut StateDict, name: &str, block: &ConvBlock<B>) -> Result<()> {
    state.insert(
        format!("{}.conv.weight", name),
        TensorEntry::from_tensor(block.conv.weight.val())?,
    );
    if let Some(bias) = &block.conv.bias {
        state.insert(format!("{}.conv.bias", name), TensorEntry::from_tensor(bias.val())?);
    }
    state.insert(format!("{}.bn.gamma", name), TensorEntry::from_tensor(block.bn.gamma.val())?);
    state.insert(format!("{}.bn.beta", name), TensorEntry::from_tensor(block.bn.beta.val())?);
    state.insert(
        format!("{}.bn.running_mean", name),
        TensorEntry::from_tensor(block.bn.running_mean.value())?,
    );
    state.insert(
        format!("{}.bn.running_var", name),
        TensorEntry::from_tensor(block.bn.running_var.value())?,
    );
    Ok(())
}

/// Write `model` as a raw JSON parameter mapping
pub fn save_checkpoint<B: Backend>(model: &PlantClassifier<B>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| SeverityError::output(parent, e))?;
    }

    let json = serde_json::to_string(&state_dict(model)?)?;
    fs::write(path, json).map_err(|e| SeverityError::output(path, e))?;

    info!("Checkpoint saved to {:?}", path);
    Ok(())
}

struct StateLoader<'a, B: Backend> {
    state: StateDict,
    report: CheckpointReport,
    device: &'a B::Device,
}

impl<B: Backend> StateLoader<'_, B> {
    fn tensor<const D: usize>(&mut self, name: &str, current: [usize; D]) -> Option<Tensor<B, D>> {
        let Some(entry) = self.state.remove(name) else {
            self.report.missing.push(name.to_string());
            return None;
        };

        if entry.shape != current {
            debug!("{}: checkpoint {:?} vs model {:?}", name, entry.shape, current);
            self.report.mismatched.push(name.to_string());
            return None;
        }

        self.report.loaded.push(name.to_string());
        Some(Tensor::from_data(TensorData::new(entry.data, current), self.device))
    }

    fn param<const D: usize>(&mut self, name: &str, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        match self.tensor(name, param.val().dims()) {
            Some(tensor) => Param::from_tensor(tensor),
            None => param,
        }
    }

    fn optional<const D: usize>(
        &mut self,
        name: &str,
        param: Option<Param<Tensor<B, D>>>,
    ) -> Option<Param<Tensor<B, D>>> {
        param.map(|p| self.param(name, p))
    }

    fn running<const D: usize>(
        &mut self,
        name: &str,
        state: RunningState<Tensor<B, D>>,
    ) -> RunningState<Tensor<B, D>> {
        let current = state.value();
        match self.tensor(name, current.dims()) {
            Some(tensor) => RunningState::new(tensor),
            None => state,
        }
    }

    fn conv_block(&mut self, name: &str, mut block: ConvBlock<B>) -> ConvBlock<B> {
        block.conv.weight = self.param(&format!("{}.conv.weight", name), block.conv.weight);
        block.conv.bias = self.optional(&format!("{}.conv.bias", name), block.conv.bias);
        block.bn.gamma = self.param(&format!("{}.bn.gamma", name), block.bn.gamma);
        block.bn.beta = self.param(&format!("{}.bn.beta", name), block.bn.beta);
        block.bn.running_mean =
            self.running(&format!("{}.bn.running_mean", name), block.bn.running_mean);
        block.bn.running_var =
            self.running(&format!("{}.bn.running_var", name), block.bn.running_var);
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cnn::PlantClassifierConfig;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn small_model(seed: u64) -> PlantClassifier<TestBackend> {
        let device = Default::default();
        TestBackend::seed(seed);
        PlantClassifierConfig::new()
            .with_input_size(32)
            .with_base_filters(4)
            .init(&device)
    }

    fn logits(model: &PlantClassifier<TestBackend>) -> Vec<f32> {
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &Default::default());
        model.forward(input).into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_state_dict_names() {
        let state = state_dict(&small_model(1)).unwrap();
        assert_eq!(state.len(), 28);
        assert!(state.contains_key("conv1.conv.weight"));
        assert!(state.contains_key("conv4.bn.running_var"));
        assert_eq!(state["fc2.weight"].shape, vec![256, 3]);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("models/best_classifier.json");

        let trained = small_model(7);
        save_checkpoint(&trained, &path).unwrap();

        let source = resolve_checkpoint_path(&path).unwrap();
        assert_eq!(source, CheckpointSource::Json(path.clone()));

        let fresh = small_model(8);
        assert_ne!(logits(&fresh), logits(&trained));

        let (loaded, report) = load_checkpoint(fresh, &source, &Default::default()).unwrap();
        assert!(report.is_complete());
        assert!(report.unexpected.is_empty());
        assert_eq!(report.loaded.len(), 28);
        assert_eq!(logits(&loaded), logits(&trained));
    }

    #[test]
    fn test_wrapped_state_is_unwrapped() {
        let state = state_dict(&small_model(3)).unwrap();
        for key in STATE_KEYS {
            let wrapped = serde_json::json!({ key: &state, "epoch": 4 });
            let (parsed, rejected) = parse_state_dict(&wrapped.to_string()).unwrap();
            assert_eq!(parsed, state);
            assert!(rejected.is_empty());
        }
    }

    #[test]
    fn test_partial_mapping_loads_non_strict() {
        let mut state = state_dict(&small_model(5)).unwrap();
        state.remove("fc2.bias");
        state.insert(
            "fc3.weight".to_string(),
            TensorEntry {
                shape: vec![1],
                data: vec![0.0],
            },
        );
        if let Some(entry) = state.get_mut("fc1.weight") {
            entry.shape = vec![entry.data.len()];
        }

        let (_, report) = apply_state_dict(small_model(6), state, &Default::default());
        assert_eq!(report.missing, vec!["fc2.bias"]);
        assert_eq!(report.unexpected, vec!["fc3.weight"]);
        assert_eq!(report.mismatched, vec!["fc1.weight"]);
        assert_eq!(report.loaded.len(), 26);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_non_tensor_entries_are_unexpected() {
        let (state, rejected) =
            parse_state_dict(r#"{"fc1.bias": {"shape": [2], "data": [1.0, 2.0]}, "epoch": 3}"#)
                .unwrap();
        assert_eq!(state.len(), 1);
        assert_eq!(rejected, vec!["epoch"]);
    }

    #[test]
    fn test_corrupt_checkpoint_is_error() {
        assert!(matches!(
            parse_state_dict("not json"),
            Err(SeverityError::Checkpoint(_))
        ));
        assert!(parse_state_dict("[1, 2]").is_err());
        assert!(parse_state_dict(r#"{"w": {"shape": [3], "data": [1.0]}}"#).is_err());
    }

    #[test]
    fn test_resolve_missing_and_mpk() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("best_model");
        assert!(resolve_checkpoint_path(&base).is_none());

        std::fs::write(temp_dir.path().join("best_model.mpk"), b"").unwrap();
        assert_eq!(
            resolve_checkpoint_path(&base),
            Some(CheckpointSource::Record(base.clone()))
        );
        assert_eq!(
            resolve_checkpoint_path(&temp_dir.path().join("best_model.mpk")),
            Some(CheckpointSource::Record(base))
        );
    }
}
