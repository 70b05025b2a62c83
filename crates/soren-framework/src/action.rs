//! Declared actions.

use std::fmt;

use soren_core::{ActionDescriptor, ActionForm, Icon};

use crate::handler::RequestHandler;

/// An invokable operation: catalogue entry, form and execute handler.
///
/// # Example
///
/// ```rust,ignore
/// let resize = Action::new("resize", handler_fn(resize_handler))
///     .with_title("Resize")
///     .with_description("Resize an image")
///     .with_icon("material", "crop");
/// ```
#[derive(Clone)]
pub struct Action {
    descriptor: ActionDescriptor,
    form: ActionForm,
    handler: RequestHandler,
}

impl Action {
    /// Creates an action named `method` handled by `handler`.
    pub fn new(method: impl Into<String>, handler: RequestHandler) -> Self {
        Self {
            descriptor: ActionDescriptor {
                method: method.into(),
                ..Default::default()
            },
            form: ActionForm::default(),
            handler,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.descriptor.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = description.into();
        self
    }

    pub fn with_icon(mut self, reference: impl Into<String>, icon: impl Into<String>) -> Self {
        self.descriptor.icon = Icon {
            reference: reference.into(),
            icon: icon.into(),
        };
        self
    }

    /// Sets the form served on `soren.v2.<id>.<method>.@form`.
    pub fn with_form(mut self, form: ActionForm) -> Self {
        self.form = form;
        self
    }

    pub fn method(&self) -> &str {
        &self.descriptor.method
    }

    /// The catalogue entry, without the handler.
    pub fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    pub fn form(&self) -> &ActionForm {
        &self.form
    }

    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("descriptor", &self.descriptor)
            .field("form", &self.form)
            .finish_non_exhaustive()
    }
}
