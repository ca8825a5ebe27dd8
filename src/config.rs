use std::collections::BTreeSet;
use std::path::PathBuf;

/// Pipeline configuration, passed explicitly through every stage.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory of `.class` files or a `.jar`/`.zip` archive.
    pub input_root: PathBuf,
    /// Directory receiving the generated translation units.
    pub output_root: PathBuf,
    /// Classes forming the reachability root set (internal slashed names).
    pub entry_classes: Vec<String>,
    /// Keep entities the reachability pass did not mark.
    pub keep_unreachable: bool,
    /// Skip emission of unreachable classes.
    pub elide_dead_code: bool,
    /// Emit runtime checks in generated code.
    pub emit_assertions: bool,
    /// Runtime ABI revision the emitted code targets.
    pub abi_version: u32,
    /// Classes satisfied by the runtime's own core library; references to
    /// them link as opaque externals instead of failing.
    pub runtime_provided: BTreeSet<String>,
    /// Staging directory hint for output before atomic rename.
    pub temp_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("."),
            output_root: PathBuf::from("out"),
            entry_classes: Vec::new(),
            keep_unreachable: false,
            elide_dead_code: true,
            emit_assertions: false,
            abi_version: 2,
            runtime_provided: BTreeSet::new(),
            temp_dir: None,
        }
    }
}

impl Config {
    pub fn is_runtime_provided(&self, class_name: &str) -> bool {
        self.runtime_provided.contains(class_name)
    }
}
