// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Error types for probkit operations

use std::fmt;

/// ErrorKind is all kinds of Error of probkit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The construction parameters are invalid, or two structures with
    /// mismatched shapes were combined.
    Initialization,
    /// A cuckoo filter insert exhausted its eviction budget.
    CuckooFilterFull,
    /// The operation is unavailable on this structure or policy.
    NotSupported,
    /// The count-min aggregation policy tag is unrecognized.
    Policy,
    /// The serialized data is truncated, malformed, or inconsistent.
    Persistence,
}

impl ErrorKind {
    /// Convert this error kind instance into static str.
    pub const fn into_static(self) -> &'static str {
        match self {
            ErrorKind::Initialization => "Initialization",
            ErrorKind::CuckooFilterFull => "CuckooFilterFull",
            ErrorKind::NotSupported => "NotSupported",
            ErrorKind::Policy => "Policy",
            ErrorKind::Persistence => "Persistence",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

/// Error is the error struct returned by all probkit functions.
///
/// # Examples
///
/// ```
/// # use probkit::error::Error;
/// # use probkit::error::ErrorKind;
/// let err = Error::new(ErrorKind::Initialization, "bad input");
/// assert_eq!(err.kind(), ErrorKind::Initialization);
/// assert_eq!(err.message(), "bad input");
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: vec![],
        }
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Return error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return error's message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

// Convenience constructors
impl Error {
    pub(crate) fn initialization(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Initialization, msg)
    }

    pub(crate) fn cuckoo_full(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::CuckooFilterFull, msg)
    }

    pub(crate) fn not_supported(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, msg)
    }

    pub(crate) fn policy(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Policy, msg)
    }

    pub(crate) fn persistence(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Persistence, msg)
    }

    pub(crate) fn insufficient_data(field: impl fmt::Display) -> Self {
        Self::persistence(format!("insufficient data: {field}"))
    }

    pub(crate) fn size_mismatch(expected: usize, actual: usize, name: &'static str) -> Self {
        Self::persistence(format!(
            "size mismatch ({name}): expected {expected} bytes, got {actual}"
        ))
    }

    pub(crate) fn io(op: &'static str, err: std::io::Error) -> Self {
        Self::persistence(format!("{op} failed")).with_context("source", err)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // If alternate has been specified, we will print like Debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "   {k}: {v}")?;
            }
        }

        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}
