//! Errors that cross from the importer and exporter into the UI.

use thiserror::Error;

use crate::resources::ModelFormat;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported file format: {file_name}")]
    UnsupportedFormat { file_name: String },
    #[error("could not read {file_name}")]
    Read {
        file_name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("could not parse {file_name} as {format}")]
    Parse {
        file_name: String,
        format: ModelFormat,
        #[source]
        source: anyhow::Error,
    },
    #[error("{file_name} contains no geometry")]
    Empty { file_name: String },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("texture {0} still has a live pixel source; normalize the scene before exporting")]
    LiveTexture(String),
    #[error("could not encode texture image")]
    Encode(#[source] anyhow::Error),
    #[error("could not serialize glTF JSON")]
    Serialize(#[from] serde_json::Error),
    #[error("could not assemble GLB container")]
    Glb(#[from] gltf::Error),
    #[error("could not save {file_name}")]
    Save {
        file_name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ImportError {
    pub fn file_name(&self) -> &str {
        match self {
            ImportError::UnsupportedFormat { file_name }
            | ImportError::Read { file_name, .. }
            | ImportError::Parse { file_name, .. }
            | ImportError::Empty { file_name } => file_name,
        }
    }
}

/// Render an error with its whole cause chain on one line, for status lines and logs.
pub fn report(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_report_full_cause_chain() {
        let error = ImportError::Parse {
            file_name: "cube.glb".to_string(),
            format: ModelFormat::Gltf,
            source: anyhow::anyhow!("unexpected end of file"),
        };
        assert_eq!(
            report(&error),
            "could not parse cube.glb as glTF: unexpected end of file"
        );
    }
}
