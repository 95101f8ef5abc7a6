//! Reader/writer objects for the solver's standard input files.
//!
//! [`DictFile`] pairs a parsed dictionary with its case-relative filename and
//! `FoamFile` header. The typed views ([`ControlDict`], [`DecomposeParDict`],
//! and friends) layer validated setters and default entries on top, so
//! callers cannot write an enumerated keyword the solver would reject.

use std::fs;
use std::path::{Path, PathBuf};

use crate::value::{Dictionary, Value};
use crate::{parser, printer, DictError, DictResult};

/// A solver input file: case-relative path, optional `FoamFile` header, and
/// the body entries.
#[derive(Debug, Clone)]
pub struct DictFile {
    /// Path relative to the case directory, e.g. `system/controlDict`.
    pub path: PathBuf,
    /// `FoamFile` header block; regenerated on write when absent.
    pub header: Option<Dictionary>,
    pub data: Dictionary,
}

impl DictFile {
    /// Files larger than this are not parsed (field dumps can run to
    /// hundreds of megabytes).
    const SIZE_LIMIT: u64 = 10 * (1 << 20);

    /// New empty file object with a default header; nothing is read.
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        let path = filename.into();
        let header = Some(default_header(&path));
        DictFile {
            path,
            header,
            data: Dictionary::new(),
        }
    }

    /// Load `filename` from within `casedir`, splitting off the `FoamFile`
    /// header. Missing files are an error.
    pub fn load(casedir: &Path, filename: impl Into<PathBuf>) -> DictResult<Self> {
        let path = filename.into();
        let full = casedir.join(&path);
        if !full.exists() {
            return Err(DictError::FileNotFound(full));
        }
        if fs::metadata(&full)?.len() > Self::SIZE_LIMIT {
            tracing::warn!(
                path = %full.display(),
                "file exceeds parse size limit; contents left unread"
            );
            return Ok(DictFile {
                header: Some(default_header(&path)),
                path,
                data: Dictionary::new(),
            });
        }
        let mut data = parser::parse_file(&full)?;
        let header = match data.remove("FoamFile") {
            Some(Value::Dict(h)) => Some(h),
            _ => None,
        };
        Ok(DictFile { path, header, data })
    }

    /// Load the file if it exists, else return an empty object.
    pub fn read_if_present(casedir: &Path, filename: impl Into<PathBuf>) -> DictResult<Self> {
        let path = filename.into();
        if casedir.join(&path).exists() {
            Self::load(casedir, path)
        } else {
            Ok(Self::new(path))
        }
    }

    /// Write the formatted file under `casedir`, refreshing the header's
    /// `location` and `object` entries to match the current path.
    pub fn write(&self, casedir: &Path) -> DictResult<()> {
        let full = casedir.join(&self.path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        let header = default_header(&self.path);
        tracing::info!(path = %full.display(), "writing input file");
        printer::write_file(&full, Some(&header), &self.data)
    }

    /// Serialize the body entries without banner or header.
    pub fn to_text(&self) -> String {
        printer::serialize(&self.data)
    }
}

/// Standard `FoamFile` header for a case-relative filename.
fn default_header(path: &Path) -> Dictionary {
    let mut header = Dictionary::new();
    header.insert("version", Value::Float(2.0));
    header.insert("format", Value::from("ascii"));
    header.insert("class", Value::from("dictionary"));
    if let Some(location) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        header.insert(
            "location",
            Value::Str(location.to_string_lossy().into_owned()),
        );
    }
    if let Some(object) = path.file_name() {
        header.insert("object", Value::Str(object.to_string_lossy().into_owned()));
    }
    header
}

/// Set `key` after checking `value` against the allowed options.
fn set_enumerated(
    data: &mut Dictionary,
    key: &'static str,
    value: &str,
    allowed: &'static [&'static str],
) -> DictResult<()> {
    if !allowed.contains(&value) {
        return Err(DictError::Validation {
            key: key.to_string(),
            value: value.to_string(),
            allowed,
        });
    }
    data.insert(key, Value::from(value));
    Ok(())
}

macro_rules! dict_view {
    ($(#[$meta:meta])* $name:ident, $filename:expr, defaults: $defaults:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            pub file: DictFile,
        }

        impl $name {
            pub const DEFAULT_FILENAME: &'static str = $filename;

            /// New object with the view's default entries populated.
            pub fn new() -> Self {
                let mut file = DictFile::new(Self::DEFAULT_FILENAME);
                let populate: fn(&mut Dictionary) = $defaults;
                populate(&mut file.data);
                Self { file }
            }

            pub fn load(casedir: &Path) -> DictResult<Self> {
                Ok(Self {
                    file: DictFile::load(casedir, Self::DEFAULT_FILENAME)?,
                })
            }

            /// Read the file if present in the case, else start from the
            /// defaults.
            pub fn read_if_present(casedir: &Path) -> DictResult<Self> {
                if casedir.join(Self::DEFAULT_FILENAME).exists() {
                    Self::load(casedir)
                } else {
                    Ok(Self::new())
                }
            }

            pub fn write(&self, casedir: &Path) -> DictResult<()> {
                self.file.write(casedir)
            }

            pub fn data(&self) -> &Dictionary {
                &self.file.data
            }

            pub fn data_mut(&mut self) -> &mut Dictionary {
                &mut self.file.data
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
    ($(#[$meta:meta])* $name:ident, $filename:expr) => {
        dict_view!($(#[$meta])* $name, $filename, defaults: |_: &mut Dictionary| {});
    };
}

dict_view!(
    /// `system/controlDict` interface.
    ControlDict,
    "system/controlDict",
    defaults: |data: &mut Dictionary| {
        data.insert("startFrom", Value::from("latestTime"));
        data.insert("startTime", Value::Int(0));
        data.insert("stopAt", Value::from("endTime"));
        data.insert("writeControl", Value::from("timeStep"));
        data.insert("purgeWrite", Value::Int(0));
        data.insert("writeFormat", Value::from("ascii"));
        data.insert("writePrecision", Value::Int(6));
        data.insert("writeCompression", Value::Bool(true));
        data.insert("timeFormat", Value::from("general"));
        data.insert("timePrecision", Value::Int(6));
        data.insert("runTimeModifiable", Value::Bool(true));
    }
);

impl ControlDict {
    pub const START_FROM: &'static [&'static str] = &["firstTime", "startTime", "latestTime"];
    pub const STOP_AT: &'static [&'static str] =
        &["endTime", "writeNow", "noWriteNow", "nextWrite"];
    pub const WRITE_CONTROL: &'static [&'static str] = &[
        "timeStep",
        "runTime",
        "adjustableRunTime",
        "cpuTime",
        "clockTime",
    ];
    pub const WRITE_FORMAT: &'static [&'static str] = &["ascii", "binary"];
    pub const TIME_FORMAT: &'static [&'static str] = &["fixed", "scientific", "general"];

    pub fn application(&self) -> Option<&str> {
        self.data().get("application").and_then(Value::as_str)
    }

    pub fn set_application(&mut self, app: &str) {
        self.data_mut().insert("application", Value::from(app));
    }

    pub fn end_time(&self) -> Option<f64> {
        self.data().get("endTime").and_then(Value::as_float)
    }

    pub fn set_start_from(&mut self, value: &str) -> DictResult<()> {
        set_enumerated(self.data_mut(), "startFrom", value, Self::START_FROM)
    }

    pub fn set_stop_at(&mut self, value: &str) -> DictResult<()> {
        set_enumerated(self.data_mut(), "stopAt", value, Self::STOP_AT)
    }

    pub fn set_write_control(&mut self, value: &str) -> DictResult<()> {
        set_enumerated(self.data_mut(), "writeControl", value, Self::WRITE_CONTROL)
    }

    pub fn set_write_format(&mut self, value: &str) -> DictResult<()> {
        set_enumerated(self.data_mut(), "writeFormat", value, Self::WRITE_FORMAT)
    }

    pub fn set_time_format(&mut self, value: &str) -> DictResult<()> {
        set_enumerated(self.data_mut(), "timeFormat", value, Self::TIME_FORMAT)
    }
}

dict_view!(
    /// `system/decomposeParDict` interface.
    DecomposeParDict,
    "system/decomposeParDict",
    defaults: |data: &mut Dictionary| {
        data.insert("numberOfSubdomains", Value::Int(4));
        data.insert("method", Value::from("scotch"));
    }
);

impl DecomposeParDict {
    pub const METHODS: &'static [&'static str] =
        &["scotch", "metis", "simple", "hierarchical", "manual"];

    pub fn number_of_subdomains(&self) -> i64 {
        self.data()
            .get("numberOfSubdomains")
            .and_then(Value::as_int)
            .unwrap_or(1)
    }

    pub fn set_number_of_subdomains(&mut self, count: i64) {
        self.data_mut().insert("numberOfSubdomains", Value::Int(count));
    }

    pub fn method(&self) -> Option<&str> {
        self.data().get("method").and_then(Value::as_str)
    }

    pub fn set_method(&mut self, value: &str) -> DictResult<()> {
        set_enumerated(self.data_mut(), "method", value, Self::METHODS)
    }
}

dict_view!(
    /// `constant/turbulenceProperties` interface.
    TurbulenceProperties,
    "constant/turbulenceProperties",
    defaults: |data: &mut Dictionary| {
        data.insert("simulationType", Value::from("laminar"));
    }
);

impl TurbulenceProperties {
    pub const SIMULATION_TYPES: &'static [&'static str] = &["laminar", "RASModel", "LESModel"];

    pub fn simulation_type(&self) -> Option<&str> {
        self.data().get("simulationType").and_then(Value::as_str)
    }

    pub fn set_simulation_type(&mut self, value: &str) -> DictResult<()> {
        set_enumerated(
            self.data_mut(),
            "simulationType",
            value,
            Self::SIMULATION_TYPES,
        )
    }
}

dict_view!(
    /// `constant/transportProperties` interface.
    TransportProperties,
    "constant/transportProperties",
    defaults: |data: &mut Dictionary| {
        data.insert("transportModel", Value::from("Newtonian"));
    }
);

impl TransportProperties {
    pub const MODELS: &'static [&'static str] = &[
        "Newtonian",
        "powerLaw",
        "CrossPowerLaw",
        "BirdCarreau",
        "HerschelBulkley",
    ];

    pub fn transport_model(&self) -> Option<&str> {
        self.data().get("transportModel").and_then(Value::as_str)
    }

    pub fn set_transport_model(&mut self, value: &str) -> DictResult<()> {
        set_enumerated(self.data_mut(), "transportModel", value, Self::MODELS)
    }
}

dict_view!(
    /// `constant/RASProperties` interface.
    RasProperties,
    "constant/RASProperties",
    defaults: |data: &mut Dictionary| {
        data.insert("turbulence", Value::Bool(true));
        data.insert("printCoeffs", Value::Bool(true));
    }
);

impl RasProperties {
    pub fn model(&self) -> Option<&str> {
        self.data().get("RASModel").and_then(Value::as_str)
    }

    /// Select the closure model, creating its empty `<model>Coeffs`
    /// block when not already present.
    pub fn set_model(&mut self, model: &str) {
        self.data_mut().insert("RASModel", Value::from(model));
        let coeffs_key = format!("{model}Coeffs");
        if !self.data().contains_key(&coeffs_key) {
            self.data_mut().insert(coeffs_key.as_str(), Value::Dict(Dictionary::new()));
        }
    }

    /// Coefficient block for the currently selected model.
    pub fn coeffs(&self) -> Option<&Dictionary> {
        let model = self.model()?;
        self.data().get_dict(&format!("{model}Coeffs"))
    }
}

dict_view!(
    /// `constant/LESProperties` interface.
    LesProperties,
    "constant/LESProperties",
    defaults: |data: &mut Dictionary| {
        data.insert("LESModel", Value::from("Smagorinsky"));
        data.insert("delta", Value::from("cubeRootVol"));
        data.insert("turbulence", Value::Bool(true));
        data.insert("printCoeffs", Value::Bool(true));
        let mut delta_coeffs = Dictionary::new();
        delta_coeffs.insert("deltaCoeff", Value::Int(1));
        data.insert("cubeRootVolCoeffs", Value::Dict(delta_coeffs));
    }
);

impl LesProperties {
    pub const DELTAS: &'static [&'static str] = &[
        "cubeRootVol",
        "vanDriest",
        "smooth",
        "Prandtl",
        "maxDeltaxyz",
    ];

    pub fn model(&self) -> Option<&str> {
        self.data().get("LESModel").and_then(Value::as_str)
    }

    pub fn set_model(&mut self, model: &str) {
        self.data_mut().insert("LESModel", Value::from(model));
        let coeffs_key = format!("{model}Coeffs");
        if !self.data().contains_key(&coeffs_key) {
            self.data_mut().insert(coeffs_key.as_str(), Value::Dict(Dictionary::new()));
        }
    }

    pub fn set_delta(&mut self, value: &str) -> DictResult<()> {
        set_enumerated(self.data_mut(), "delta", value, Self::DELTAS)
    }
}

dict_view!(
    /// `constant/polyMesh/blockMeshDict` interface.
    BlockMeshDict,
    "constant/polyMesh/blockMeshDict",
    defaults: |data: &mut Dictionary| {
        data.insert("convertToMeters", Value::Float(1.0));
    }
);

impl BlockMeshDict {
    pub fn convert_to_meters(&self) -> f64 {
        self.data()
            .get("convertToMeters")
            .and_then(Value::as_float)
            .unwrap_or(1.0)
    }
}

dict_view!(
    /// `system/changeDictionaryDict` interface: free-form replacement
    /// entries consumed by the `changeDictionary` utility.
    ChangeDictionaryDict,
    "system/changeDictionaryDict"
);

dict_view!(
    /// `system/fvSchemes` interface.
    FvSchemes,
    "system/fvSchemes"
);

impl FvSchemes {
    pub fn div_schemes(&self) -> Option<&Dictionary> {
        self.data().get_dict("divSchemes")
    }
}

dict_view!(
    /// `system/fvSolution` interface.
    FvSolution,
    "system/fvSolution"
);

impl FvSolution {
    pub fn solvers(&self) -> Option<&Dictionary> {
        self.data().get_dict("solvers")
    }
}

dict_view!(
    /// `simControls` interface: free-form solver parameters at the case
    /// root, the usual target for parametric overrides.
    SimControls,
    "simControls"
);
