//! Block-structured parameter store.
//!
//! Two-level map from block name to named scalar parameters, guarded by a
//! single reader/writer lock. Loads validate a detached copy before touching
//! the store; reads hand out clones.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use super::errors::{ScheduleViolation, StoreError, StoreResult};
use super::schedule::{self, ScheduleMode, ScheduleUpdate};
use super::source::{parse_source, SourceFormat};
use crate::types::{ParamKind, ParamValue};

/// Parameters of one block, keyed by name.
pub type Block = BTreeMap<String, ParamValue>;

/// All blocks, keyed by block name.
pub type Blocks = BTreeMap<String, Block>;


/// Thread-safe parameter store.
///
/// `load*`, `set`, `get_or_add` and the output scheduler take the lock
/// exclusively; every other method takes it shared.
#[derive(Debug, Default)]
pub struct ParameterStore {
    blocks: RwLock<Blocks>,
}

impl ParameterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        ParameterStore {
            blocks: RwLock::new(Blocks::new()),
        }
    }

    // -------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------

    /// Load a JSON source. See [`ParameterStore::load_str`].
    pub fn load(&self, text: &str) -> StoreResult<()> {
        self.load_str(text, SourceFormat::Json)
    }

    /// Parse, validate and merge a source into the store.
    ///
    /// Existing parameters named by the source are overwritten, others are
    /// left alone; new blocks are inserted whole. On any error the store is
    /// unchanged.
    pub fn load_str(&self, text: &str, format: SourceFormat) -> StoreResult<()> {
        let parsed = match parse_source(text, format) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "rejected parameter source");
                return Err(e);
            }
        };
        let parameters: usize = parsed.values().map(|b| b.len()).sum();
        let block_count = parsed.len();

        let mut blocks = self.blocks.write();
        if blocks.is_empty() {
            *blocks = parsed;
        } else {
            for (name, block) in parsed {
                match blocks.get_mut(&name) {
                    Some(existing) => existing.extend(block),
                    None => {
                        blocks.insert(name, block);
                    }
                }
            }
        }
        debug!(blocks = block_count, parameters, "loaded parameter source");
        Ok(())
    }

    /// Read a file and load it, picking JSON or YAML from the extension.
    pub fn load_file(&self, path: &Path) -> StoreResult<()> {
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "read parameter file");
        self.load_str(&text, SourceFormat::from_path(path))
    }

    // -------------------------------------------------------------------
    // Point access
    // -------------------------------------------------------------------

    /// Copy of the value stored at `block`/`name`.
    pub fn get(&self, block: &str, name: &str) -> StoreResult<ParamValue> {
        let blocks = self.blocks.read();
        let params = blocks
            .get(block)
            .ok_or_else(|| StoreError::BlockNotFound(block.to_string()))?;
        params
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::ParameterNotFound {
                block: block.to_string(),
                name: name.to_string(),
            })
    }

    pub fn get_real(&self, block: &str, name: &str) -> StoreResult<f64> {
        let value = self.get(block, name)?;
        value
            .as_f64()
            .ok_or_else(|| wrong_kind(block, name, ParamKind::Number, &value))
    }

    pub fn get_bool(&self, block: &str, name: &str) -> StoreResult<bool> {
        let value = self.get(block, name)?;
        value
            .as_bool()
            .ok_or_else(|| wrong_kind(block, name, ParamKind::Bool, &value))
    }

    pub fn get_string(&self, block: &str, name: &str) -> StoreResult<String> {
        match self.get(block, name)? {
            ParamValue::String(s) => Ok(s),
            other => Err(wrong_kind(block, name, ParamKind::String, &other)),
        }
    }

    /// Upsert a value, creating the block if needed.
    pub fn set(&self, block: &str, name: &str, value: impl Into<ParamValue>) {
        let value = value.into();
        let mut blocks = self.blocks.write();
        blocks
            .entry(block.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Return the stored value, first inserting `default` if there is none.
    pub fn get_or_add(
        &self,
        block: &str,
        name: &str,
        default: impl Into<ParamValue>,
    ) -> ParamValue {
        let mut blocks = self.blocks.write();
        blocks
            .entry(block.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| default.into())
            .clone()
    }

    // -------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------

    pub fn contains_block(&self, block: &str) -> bool {
        self.blocks.read().contains_key(block)
    }

    pub fn contains(&self, block: &str, name: &str) -> bool {
        self.blocks
            .read()
            .get(block)
            .map_or(false, |params| params.contains_key(name))
    }

    /// Block names in sorted order.
    pub fn block_names(&self) -> Vec<String> {
        self.blocks.read().keys().cloned().collect()
    }

    /// Copy of a whole block.
    pub fn block(&self, block: &str) -> StoreResult<Block> {
        self.blocks
            .read()
            .get(block)
            .cloned()
            .ok_or_else(|| StoreError::BlockNotFound(block.to_string()))
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    // -------------------------------------------------------------------
    // Snapshot
    // -------------------------------------------------------------------

    /// Pretty-printed JSON of the whole store with sorted keys, or an empty
    /// string if nothing has been loaded or set.
    ///
    /// Non-finite numbers have no JSON form and are written as `null`.
    pub fn dump(&self) -> String {
        let blocks = self.blocks.read();
        if blocks.is_empty() {
            return String::new();
        }

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        if let Err(e) = blocks.serialize(&mut ser) {
            warn!(error = %e, "failed to serialize parameter store");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }

    /// Write the dump to `path`, followed by a newline. A store with no
    /// blocks is written as `{}` so the file always loads back.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let mut content = self.dump();
        if content.is_empty() {
            content.push_str("{}");
        }
        content.push('\n');
        std::fs::write(path, content).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "wrote parameter dump");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Output scheduling
    // -------------------------------------------------------------------

    /// Rewind (`reference_time == -1`) or advance the `next_time` of every
    /// output block, returning the values that changed.
    ///
    /// # Panics
    ///
    /// When an output block lacks a numeric `dt`, or lacks a numeric
    /// `next_time` in rewind mode. Callers are expected to have validated
    /// these keys; no block is modified when this happens.
    pub fn advance_output_schedule(&self, reference_time: f64) -> Vec<ScheduleUpdate> {
        match self.try_advance_output_schedule(reference_time) {
            Ok(updates) => updates,
            Err(violation) => panic!("output schedule precondition violated: {}", violation),
        }
    }

    /// Non-panicking form of [`ParameterStore::advance_output_schedule`].
    pub fn try_advance_output_schedule(
        &self,
        reference_time: f64,
    ) -> Result<Vec<ScheduleUpdate>, ScheduleViolation> {
        let mode = ScheduleMode::from_reference_time(reference_time);
        let mut blocks = self.blocks.write();
        let updates = schedule::plan(&blocks, mode)?;
        schedule::apply(&mut blocks, &updates);
        for update in &updates {
            debug!(
                block = %update.block,
                previous = ?update.previous,
                next_time = update.next_time,
                "moved output next_time"
            );
        }
        Ok(updates)
    }
}


fn wrong_kind(block: &str, name: &str, expected: ParamKind, found: &ParamValue) -> StoreError {
    StoreError::WrongKind {
        block: block.to_string(),
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("simparam_store_tests").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn loaded(source: serde_json::Value) -> ParameterStore {
        let store = ParameterStore::new();
        store.load(&source.to_string()).unwrap();
        store
    }

    #[test]
    fn load_then_get() {
        let store = loaded(json!({"time": {"tlim": 0.3, "integrator": "vl2", "restart": false}}));
        assert_eq!(store.get("time", "tlim").unwrap(), ParamValue::Number(0.3));
        assert_eq!(store.get("time", "integrator").unwrap(), ParamValue::from("vl2"));
        assert_eq!(store.get("time", "restart").unwrap(), ParamValue::Bool(false));
    }

    #[test]
    fn load_merges_new_parameters() {
        let store = loaded(json!({"A": {"x": 1}}));
        store.load(&json!({"A": {"y": 2}}).to_string()).unwrap();
        assert_eq!(store.block("A").unwrap().len(), 2);
        assert_eq!(store.get_real("A", "x").unwrap(), 1.0);
        assert_eq!(store.get_real("A", "y").unwrap(), 2.0);
    }

    #[test]
    fn load_overwrites_existing_parameters() {
        let store = loaded(json!({"A": {"x": 1}}));
        store.load(&json!({"A": {"x": 2}}).to_string()).unwrap();
        assert_eq!(store.block("A").unwrap().len(), 1);
        assert_eq!(store.get_real("A", "x").unwrap(), 2.0);
    }

    #[test]
    fn load_adds_new_blocks_and_can_change_kind() {
        let store = loaded(json!({"A": {"x": 1}}));
        store.load(&json!({"A": {"x": "one"}, "B": {"z": true}}).to_string()).unwrap();
        assert_eq!(store.get("A", "x").unwrap(), ParamValue::from("one"));
        assert_eq!(store.block_names(), vec!["A", "B"]);
    }

    #[test]
    fn rejected_load_leaves_store_unchanged() {
        let store = loaded(json!({"mesh": {"nx1": 64}}));
        let before = store.dump();

        let err = store
            .load(&json!({"A": {"x": 1}, "B": {"y": [1, 2]}}).to_string())
            .unwrap_err();
        assert!(matches!(err, StoreError::MalformedParameter { .. }));
        assert_eq!(store.dump(), before);
        assert!(!store.contains_block("A"));
    }

    #[test]
    fn rejected_first_load_leaves_store_empty() {
        let store = ParameterStore::new();
        assert!(store.load(r#"{"A": {"x": 1}, "B": {"y": null}}"#).is_err());
        assert!(store.load("not json").is_err());
        assert!(store.is_empty());
        assert_eq!(store.dump(), "");
    }

    #[test]
    fn get_distinguishes_missing_block_and_parameter() {
        let store = loaded(json!({"A": {"x": 1}}));
        match store.get("B", "x") {
            Err(StoreError::BlockNotFound(block)) => assert_eq!(block, "B"),
            other => panic!("expected BlockNotFound, got {:?}", other),
        }
        match store.get("A", "y") {
            Err(StoreError::ParameterNotFound { block, name }) => {
                assert_eq!(block, "A");
                assert_eq!(name, "y");
            }
            other => panic!("expected ParameterNotFound, got {:?}", other),
        }
    }

    #[test]
    fn returned_values_are_copies() {
        let store = loaded(json!({"A": {"x": "abc"}}));
        let mut value = store.get("A", "x").unwrap();
        if let ParamValue::String(s) = &mut value {
            s.push_str("def");
        }
        assert_eq!(value, ParamValue::from("abcdef"));
        assert_eq!(store.get("A", "x").unwrap(), ParamValue::from("abc"));

        let mut block = store.block("A").unwrap();
        block.insert("y".into(), ParamValue::Bool(true));
        assert!(!store.contains("A", "y"));
    }

    #[test]
    fn set_creates_block_and_overwrites() {
        let store = ParameterStore::new();
        store.set("output1", "dt", 0.1);
        assert!(store.contains_block("output1"));
        store.set("output1", "dt", "hourly");
        assert_eq!(store.get_string("output1", "dt").unwrap(), "hourly");
    }

    #[test]
    fn typed_getters_report_wrong_kind() {
        let store = loaded(json!({"A": {"flag": true, "n": 3}}));
        assert!(store.get_bool("A", "flag").unwrap());
        match store.get_real("A", "flag") {
            Err(StoreError::WrongKind { expected, found, .. }) => {
                assert_eq!(expected, ParamKind::Number);
                assert_eq!(found, ParamKind::Bool);
            }
            other => panic!("expected WrongKind, got {:?}", other),
        }
        assert!(matches!(store.get_string("A", "n"), Err(StoreError::WrongKind { .. })));
        assert!(matches!(store.get_bool("A", "nope"), Err(StoreError::ParameterNotFound { .. })));
    }

    #[test]
    fn get_or_add_inserts_once() {
        let store = ParameterStore::new();
        assert_eq!(store.get_or_add("time", "cfl", 0.3), ParamValue::Number(0.3));
        assert_eq!(store.get_or_add("time", "cfl", 0.9), ParamValue::Number(0.3));
        assert_eq!(store.get_real("time", "cfl").unwrap(), 0.3);
    }

    #[test]
    fn dump_is_sorted_and_indented() {
        let store = ParameterStore::new();
        store.set("zeta", "b", 2);
        store.set("zeta", "a", true);
        store.set("zeta", "c", 0.5);
        store.set("alpha", "name", "blast");
        let expected = concat!(
            "{\n",
            "    \"alpha\": {\n",
            "        \"name\": \"blast\"\n",
            "    },\n",
            "    \"zeta\": {\n",
            "        \"a\": true,\n",
            "        \"b\": 2,\n",
            "        \"c\": 0.5\n",
            "    }\n",
            "}"
        );
        assert_eq!(store.dump(), expected);
    }

    #[test]
    fn dump_reloads_into_fresh_store() {
        let store = loaded(json!({
            "output1": {"dt": 0.01, "file_type": "hdf5", "ghost_zones": false},
            "mesh": {"nx1": 256, "x1min": -0.5}
        }));
        let copy = ParameterStore::new();
        copy.load(&store.dump()).unwrap();
        assert_eq!(copy.dump(), store.dump());
        assert_eq!(copy.get("mesh", "x1min").unwrap(), ParamValue::Number(-0.5));
    }

    #[test]
    fn save_and_load_file() {
        let dir = test_dir("save_and_load_file");
        let path = dir.join("params.json");
        let store = loaded(json!({"output2": {"dt": 5, "next_time": 10}}));
        store.save(&path).unwrap();

        let copy = ParameterStore::new();
        copy.load_file(&path).unwrap();
        assert_eq!(copy.get_real("output2", "next_time").unwrap(), 10.0);
    }

    #[test]
    fn save_of_store_without_blocks_loads_back() {
        let dir = test_dir("save_without_blocks");
        let path = dir.join("empty.json");
        let store = ParameterStore::new();
        store.load("{}").unwrap();
        store.save(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}\n");

        let copy = ParameterStore::new();
        copy.load_file(&path).unwrap();
        assert!(copy.is_empty());
    }

    #[test]
    fn dump_writes_integral_numbers_without_fraction() {
        let store = loaded(json!({"mesh": {"nx1": 64, "x1min": -0.5}, "output1": {"dt": 10}}));
        let dump = store.dump();
        assert!(dump.contains("\"nx1\": 64,"));
        assert!(dump.contains("\"x1min\": -0.5"));
        assert!(dump.contains("\"dt\": 10\n"));
    }

    #[test]
    fn load_yaml_file() {
        let dir = test_dir("load_yaml_file");
        let path = dir.join("params.yaml");
        fs::write(&path, "job:\n  problem_id: Blast\nmesh:\n  nx1: 32\n").unwrap();

        let store = ParameterStore::new();
        store.load_file(&path).unwrap();
        assert_eq!(store.get_string("job", "problem_id").unwrap(), "Blast");
        assert_eq!(store.get_real("mesh", "nx1").unwrap(), 32.0);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = test_dir("load_missing_file");
        let store = ParameterStore::new();
        let err = store.load_file(&dir.join("nope.json")).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(err.to_string().contains("nope.json"));
    }

    #[test]
    fn rewind_output_schedule() {
        let store = loaded(json!({"output1": {"dt": 10, "next_time": 50}}));
        let updates = store.advance_output_schedule(-1.0);
        assert_eq!(updates.len(), 1);
        assert_eq!(store.get_real("output1", "next_time").unwrap(), 40.0);
    }

    #[test]
    fn forward_output_schedule_with_next_time() {
        let store = loaded(json!({"output1": {"dt": 10, "next_time": 50}}));
        store.advance_output_schedule(77.0);
        assert_eq!(store.get_real("output1", "next_time").unwrap(), 80.0);
    }

    #[test]
    fn forward_output_schedule_initializes_next_time() {
        let store = loaded(json!({
            "output1": {"dt": 10},
            "output2": {"dt": 7},
            "mesh": {"nx1": 8}
        }));
        store.advance_output_schedule(25.0);
        assert_eq!(store.get_real("output1", "next_time").unwrap(), 20.0);
        assert_eq!(store.get_real("output2", "next_time").unwrap(), 21.0);
        assert!(!store.contains("mesh", "next_time"));
    }

    #[test]
    #[should_panic(expected = "output schedule precondition violated")]
    fn missing_dt_is_fatal() {
        let store = loaded(json!({"output1": {}}));
        store.advance_output_schedule(10.0);
    }

    #[test]
    fn violation_leaves_every_block_untouched() {
        let store = loaded(json!({
            "output1": {"dt": 10, "next_time": 50},
            "output2": {"dt": 5}
        }));
        let before = store.dump();
        let err = store.try_advance_output_schedule(-1.0).unwrap_err();
        assert_eq!(
            err,
            ScheduleViolation::MissingKey { block: "output2".into(), key: "next_time" }
        );
        assert_eq!(store.dump(), before);
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let store = loaded(json!({"counter": {"seed": 0}}));
        let reads = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for w in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..100 {
                        store.set(&format!("block{}", w), &format!("p{}", i), i);
                    }
                });
            }
            for _ in 0..4 {
                let (store, reads) = (&store, &reads);
                scope.spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(store.get_real("counter", "seed").unwrap(), 0.0);
                        let _ = store.dump();
                        reads.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        assert_eq!(reads.load(Ordering::Relaxed), 400);
        assert_eq!(store.len(), 5);
        for w in 0..4 {
            assert_eq!(store.block(&format!("block{}", w)).unwrap().len(), 100);
        }
    }

    #[test]
    fn readers_never_see_a_half_advanced_schedule() {
        let store = loaded(json!({
            "output1": {"dt": 10, "next_time": 0},
            "output2": {"dt": 5, "next_time": 0}
        }));
        let reads = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..2 {
                let store = &store;
                scope.spawn(move || {
                    for t in 0..100 {
                        store.advance_output_schedule(t as f64 * 3.0);
                    }
                });
            }
            for _ in 0..4 {
                let (store, reads) = (&store, &reads);
                scope.spawn(move || {
                    for _ in 0..100 {
                        let block = store.block("output1").unwrap();
                        assert_eq!(block["dt"], ParamValue::Number(10.0));
                        let next = block["next_time"].as_f64().unwrap();
                        assert_eq!(next % 10.0, 0.0);
                        assert!(store.get_real("output2", "next_time").unwrap() % 5.0 == 0.0);
                        reads.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        assert_eq!(reads.load(Ordering::Relaxed), 400);
        assert_eq!(store.get_real("output1", "next_time").unwrap(), 300.0);
        assert_eq!(store.get_real("output2", "next_time").unwrap(), 300.0);
    }

    fn scalar() -> impl Strategy<Value = ParamValue> {
        prop_oneof![
            any::<bool>().prop_map(ParamValue::Bool),
            (-1.0e12f64..1.0e12).prop_map(ParamValue::Number),
            "[ -~]{0,12}".prop_map(ParamValue::String),
        ]
    }

    fn blocks() -> impl Strategy<Value = Blocks> {
        prop::collection::btree_map(
            "[a-z][a-z0-9_]{0,8}",
            prop::collection::btree_map("[a-z][a-z0-9_]{0,8}", scalar(), 0..6),
            1..5,
        )
    }

    proptest! {
        #[test]
        fn dump_round_trips(content in blocks()) {
            let store = ParameterStore::new();
            store.load(&serde_json::to_string(&content).unwrap()).unwrap();

            let copy = ParameterStore::new();
            copy.load(&store.dump()).unwrap();
            for (block, params) in &content {
                prop_assert_eq!(copy.block(block).unwrap(), params.clone());
            }
            prop_assert_eq!(copy.block_names(), store.block_names());
        }
    }
}
