use std::sync::{Arc, Mutex};

use log::info;

use crate::error::Result;

/// A lazily loaded, read-only model shared by every computation of a run.
/// The model is loaded on the first call to `get()` and kept until the last
/// clone of the returned `Arc` is dropped along with the handle.
/// Handles are created by the caller and passed explicitly; there is no global.
pub struct ModelHandle<T: ?Sized>
{
    name: String,
    loader: Box<dyn Fn() -> Result<Arc<T>> + Send + Sync>,
    model: Mutex<Option<Arc<T>>>,
}

impl<T: ?Sized> ModelHandle<T>
{
    pub fn new<F>(name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    {
        ModelHandle { name: name.into(), loader: Box::new(loader), model: Mutex::new(None) }
    }

    /// Wraps an already loaded model.
    pub fn from_loaded(name: impl Into<String>, model: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let loaded = model.clone();
        ModelHandle {
            name: name.into(),
            loader: Box::new(move || Ok(loaded.clone())),
            model: Mutex::new(Some(model)),
        }
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn is_loaded(&self) -> bool
    {
        self.model.lock().unwrap().is_some()
    }

    /// Returns the shared model, loading it first if needed.
    /// A failed load is not cached; the error goes back to the caller.
    pub fn get(&self) -> Result<Arc<T>>
    {
        let mut model = self.model.lock().unwrap();
        if let Some(model) = model.as_ref() {
            return Ok(model.clone());
        }

        info!("Loading model {}...", self.name);
        let now = std::time::Instant::now();
        let loaded = (self.loader)()?;
        info!("Loading {} took {:?}", self.name, now.elapsed());

        *model = Some(loaded.clone());
        Ok(loaded)
    }
}
