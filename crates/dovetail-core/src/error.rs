use std::sync::Arc;

/// An error produced by the duality mapping engine.
///
/// The error is one word wide and cheap to clone; the payload lives behind
/// an `Arc`. Callers classify errors through the `is_*` predicates rather
/// than by matching on an exposed kind: the taxonomy is part of the API,
/// its representation is not.
#[derive(Clone)]
pub struct Error {
    inner: Arc<ErrorInner>,
}

#[derive(Debug)]
struct ErrorInner {
    kind: ErrorKind,
    cause: Option<Error>,
}

#[derive(Debug)]
enum ErrorKind {
    /// The document's shape or a field value failed structural validation
    /// against the object tree. Recoverable by the caller (HTTP 400 class).
    JsonInput(String),

    /// The document requested an operation the object tree's capability
    /// flags forbid. Same recoverability class as `JsonInput`.
    DualityView(String),

    /// The object tree itself is malformed (no primary key, no columns,
    /// bad reduce target). A catalog/programmer error, reported distinctly
    /// so callers can tell "bad request" from "bad service configuration".
    Config(String),

    /// Propagated unchanged from the database session. The engine never
    /// interprets or retries these; it only stops the remaining cascade.
    Database(String),

    /// Bridge for foreign errors.
    Anyhow(anyhow::Error),
}

impl Error {
    pub fn json_input(message: impl Into<String>) -> Self {
        Self::from(ErrorKind::JsonInput(message.into()))
    }

    pub fn duality_view(message: impl Into<String>) -> Self {
        Self::from(ErrorKind::DualityView(message.into()))
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::from(ErrorKind::Config(message.into()))
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::from(ErrorKind::Database(message.into()))
    }

    pub fn is_json_input(&self) -> bool {
        matches!(self.kind(), ErrorKind::JsonInput(_))
    }

    pub fn is_duality_view(&self) -> bool {
        matches!(self.kind(), ErrorKind::DualityView(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self.kind(), ErrorKind::Config(_))
    }

    pub fn is_database(&self) -> bool {
        matches!(self.kind(), ErrorKind::Database(_))
    }

    /// Adds context to this error.
    ///
    /// Context is displayed first, followed by the root cause.
    pub fn context(self, consequent: Error) -> Error {
        let mut err = consequent;
        let inner = Arc::get_mut(&mut err.inner).expect("consequent error must be freshly built");
        assert!(inner.cause.is_none(), "consequent error already has a cause");
        inner.cause = Some(self);
        err
    }

    fn chain(&self) -> impl Iterator<Item = &Error> {
        let mut err = self;
        core::iter::once(err).chain(core::iter::from_fn(move || {
            err = err.inner.cause.as_ref()?;
            Some(err)
        }))
    }

    fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind() {
            ErrorKind::Anyhow(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut it = self.chain().peekable();
        while let Some(err) = it.next() {
            core::fmt::Display::fmt(err.kind(), f)?;
            if it.peek().is_some() {
                f.write_str(": ")?;
            }
        }
        Ok(())
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if !f.alternate() {
            core::fmt::Display::fmt(self, f)
        } else {
            f.debug_struct("Error")
                .field("kind", &self.inner.kind)
                .field("cause", &self.inner.cause)
                .finish()
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            ErrorKind::JsonInput(msg)
            | ErrorKind::DualityView(msg)
            | ErrorKind::Config(msg)
            | ErrorKind::Database(msg) => f.write_str(msg),
            ErrorKind::Anyhow(err) => core::fmt::Display::fmt(err, f),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Arc::new(ErrorInner { kind, cause: None }),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Error {
        Error::from(ErrorKind::Anyhow(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::from(anyhow::Error::from(err))
    }
}
