//! Where exported files end up.

use anyhow::*;

use crate::{error::ExportError, export::ExportResult};

/// Receives finished export files.
pub trait DownloadSink {
    fn save(&self, file_name: &str, mime_type: &str, bytes: &[u8]) -> Result<()>;
}

/// Hand `result` to `sink` under its canonical file name. Returns that name.
pub fn save_export(result: &ExportResult, sink: &dyn DownloadSink) -> Result<&'static str, ExportError> {
    let file_name = result.file_name();
    let bytes = result.to_bytes()?;
    sink.save(file_name, result.mime_type(), &bytes)
        .map_err(|source| ExportError::Save {
            file_name: file_name.to_string(),
            source,
        })?;
    log::info!("Saved {file_name} ({} bytes)", bytes.len());
    Result::Ok(file_name)
}

/// Writes downloads into a directory, creating it on first use.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Debug)]
pub struct DirectorySink {
    pub dir: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl DirectorySink {
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl DownloadSink for DirectorySink {
    fn save(&self, file_name: &str, _mime_type: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

/// Keep `guard` alive until the task handed to `schedule` runs.
///
/// When `schedule` fails it drops the task, and with it the guard, right away.
pub fn drop_later<G: 'static>(guard: G, schedule: impl FnOnce(Box<dyn FnOnce()>) -> Result<()>) {
    if let Err(e) = schedule(Box::new(move || drop(guard))) {
        log::warn!("Could not defer cleanup, releasing now: {e:#}");
    }
}

/// Delay before a download's object URL is revoked.
#[cfg(target_arch = "wasm32")]
const REVOKE_DELAY_MS: i32 = 100;

/// An object URL that is revoked when dropped.
#[cfg(target_arch = "wasm32")]
pub struct ObjectUrl(String);

#[cfg(target_arch = "wasm32")]
impl ObjectUrl {
    pub fn new(blob: &web_sys::Blob) -> Result<Self> {
        let url = web_sys::Url::create_object_url_with_blob(blob)
            .map_err(|e| anyhow!("could not create object URL: {e:?}"))?;
        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Revoke on a later task so a download started from this URL is not cancelled.
    pub fn revoke_later(self) {
        use wasm_bindgen::{JsCast, closure::Closure};

        drop_later(self, |task| {
            let window = web_sys::window().ok_or_else(|| anyhow!("no window"))?;
            let callback = Closure::once(move || task());
            window
                .set_timeout_with_callback_and_timeout_and_arguments_0(
                    callback.as_ref().unchecked_ref(),
                    REVOKE_DELAY_MS,
                )
                .map_err(|e| anyhow!("{e:?}"))?;
            // the browser owns the callback until the timeout fires
            callback.forget();
            Ok(())
        });
    }
}

#[cfg(target_arch = "wasm32")]
impl Drop for ObjectUrl {
    fn drop(&mut self) {
        if let Err(e) = web_sys::Url::revoke_object_url(&self.0) {
            log::warn!("Could not revoke {}: {e:?}", self.0);
        }
    }
}

/// Triggers a browser download through a hidden `<a download>` element.
#[cfg(target_arch = "wasm32")]
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserDownload;

#[cfg(target_arch = "wasm32")]
impl DownloadSink for BrowserDownload {
    fn save(&self, file_name: &str, mime_type: &str, bytes: &[u8]) -> Result<()> {
        use wasm_bindgen::JsCast;

        let js_err = |e: wasm_bindgen::JsValue| anyhow!("{e:?}");

        let parts = js_sys::Array::new();
        parts.push(&js_sys::Uint8Array::from(bytes));
        let options = web_sys::BlobPropertyBag::new();
        options.set_type(mime_type);
        let blob = web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &options)
            .map_err(js_err)?;
        let url = ObjectUrl::new(&blob)?;

        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| anyhow!("no document"))?;
        let body = document.body().ok_or_else(|| anyhow!("no document body"))?;
        let link: web_sys::HtmlAnchorElement = document
            .create_element("a")
            .map_err(js_err)?
            .dyn_into()
            .map_err(|_| anyhow!("<a> is not an anchor element"))?;
        link.style().set_property("display", "none").map_err(js_err)?;
        body.append_child(&link).map_err(js_err)?;
        link.set_href(url.as_str());
        link.set_download(file_name);
        link.click();
        url.revoke_later();
        if let Err(e) = body.remove_child(&link) {
            log::warn!("Could not remove download link: {e:?}");
        }
        Ok(())
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{data_structures::scene_graph::Scene, export::{ExportOptions, export_scene}};

    struct FailingSink;

    impl DownloadSink for FailingSink {
        fn save(&self, _: &str, _: &str, _: &[u8]) -> Result<()> {
            bail!("disk full")
        }
    }

    #[test]
    fn should_wrap_sink_failures() {
        let result = export_scene(&Scene::new(), &ExportOptions::default()).unwrap();
        let error = save_export(&result, &FailingSink).unwrap_err();
        assert_eq!(crate::error::report(&error), "could not save scene.glb: disk full");
    }

    struct Released(Rc<RefCell<bool>>);

    impl Drop for Released {
        fn drop(&mut self) {
            *self.0.borrow_mut() = true;
        }
    }

    #[test]
    fn should_release_guard_only_when_deferred_task_runs() {
        let released = Rc::new(RefCell::new(false));
        let pending = RefCell::new(None);
        drop_later(Released(released.clone()), |task| {
            *pending.borrow_mut() = Some(task);
            Ok(())
        });
        assert!(!*released.borrow());

        let task = pending.borrow_mut().take().unwrap();
        task();
        assert!(*released.borrow());
    }

    #[test]
    fn should_release_guard_at_once_when_scheduling_fails() {
        let released = Rc::new(RefCell::new(false));
        drop_later(Released(released.clone()), |_task| bail!("no timer"));
        assert!(*released.borrow());
    }
}
