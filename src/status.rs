//! User visible progress and failure messages.

use std::fmt;

use crate::error::{ExportError, ImportError, report};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Ready,
    Importing(String),
    Imported { file_name: String, meshes: usize },
    Converting,
    Saved(String),
    Failed(String),
}

impl Status {
    pub fn is_error(&self) -> bool {
        matches!(self, Status::Failed(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ready => write!(f, "Choose a model file to load"),
            Status::Importing(file_name) => write!(f, "Loading {file_name}..."),
            Status::Imported { file_name, meshes } => {
                write!(f, "Loaded {file_name} ({meshes} meshes)")
            }
            Status::Converting => write!(f, "Converting scene..."),
            Status::Saved(file_name) => write!(f, "Saved {file_name}"),
            Status::Failed(message) => write!(f, "Error: {message}"),
        }
    }
}

impl From<&ImportError> for Status {
    fn from(error: &ImportError) -> Self {
        Status::Failed(report(error))
    }
}

impl From<&ExportError> for Status {
    fn from(error: &ExportError) -> Self {
        Status::Failed(report(error))
    }
}

/// Something that shows [`Status`] lines to the user.
pub trait StatusSink {
    fn show(&self, status: &Status);
}

/// Logs every status; errors at error level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn show(&self, status: &Status) {
        if status.is_error() {
            log::error!("{status}");
        } else {
            log::info!("{status}");
        }
    }
}

/// Native viewer: the status becomes part of the window title.
#[cfg(not(target_arch = "wasm32"))]
pub struct WindowTitleStatus {
    pub window: std::sync::Arc<winit::window::Window>,
}

#[cfg(not(target_arch = "wasm32"))]
impl StatusSink for WindowTitleStatus {
    fn show(&self, status: &Status) {
        LogStatus.show(status);
        self.window.set_title(&format!("model2glb - {status}"));
    }
}

/// Browser: writes into the optional `#status` element and the console.
#[cfg(target_arch = "wasm32")]
pub struct DomStatus {
    element: Option<web_sys::Element>,
}

#[cfg(target_arch = "wasm32")]
impl DomStatus {
    pub fn from_document(document: &web_sys::Document) -> Self {
        Self {
            element: document.get_element_by_id("status"),
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl StatusSink for DomStatus {
    fn show(&self, status: &Status) {
        LogStatus.show(status);
        if let Some(element) = &self.element {
            element.set_text_content(Some(&status.to_string()));
            let class = if status.is_error() { "error" } else { "" };
            element.set_class_name(class);
        }
    }
}
