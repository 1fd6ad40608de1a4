// Copyright 2021-2022 Sebastian Ramacher
// SPDX-License-Identifier: LGPL-3.0-or-later

//! # Utils used by other modules.

use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, TimeZone, Utc};
use serde::de;

#[derive(Debug)]
pub(crate) struct DateTimeVisitor<'a>(pub &'a str);

impl<'de> de::Visitor<'de> for DateTimeVisitor<'_> {
    type Value = DateTime<Utc>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a date and time formatted as {}", self.0)
    }

    fn visit_str<E>(self, s: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        match Utc.datetime_from_str(s, self.0) {
            Ok(dt) => Ok(dt),
            Err(_) => Err(de::Error::invalid_value(de::Unexpected::Str(s), &self)),
        }
    }
}

/// Visitor that deserializes a string into `T` via `TryFrom<&str>`, discarding
/// whatever error type `T` uses in favor of serde's own invalid-value error.
#[derive(Debug)]
pub(crate) struct TryFromStrVisitor<T> {
    expecting: &'static str,
    _marker: PhantomData<T>,
}

impl<T> TryFromStrVisitor<T> {
    pub fn new(expecting: &'static str) -> Self {
        Self {
            expecting,
            _marker: PhantomData,
        }
    }
}

impl<'de, T> de::Visitor<'de> for TryFromStrVisitor<T>
where
    T: for<'a> TryFrom<&'a str>,
{
    type Value = T;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "{}", self.expecting)
    }

    fn visit_str<E>(self, s: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        T::try_from(s).map_err(|_| de::Error::invalid_value(de::Unexpected::Str(s), &self))
    }
}

/// Visitor that deserializes a whitespace separated list of strings into a `Vec<T>`
/// via `TryFrom<&str>` for each item.
#[derive(Debug)]
pub(crate) struct WhitespaceListVisitor<T> {
    _marker: PhantomData<T>,
}

impl<T> WhitespaceListVisitor<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<'de, T> de::Visitor<'de> for WhitespaceListVisitor<T>
where
    T: for<'a> TryFrom<&'a str>,
{
    type Value = Vec<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a whitespace separated list")
    }

    fn visit_str<E>(self, s: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        s.split_whitespace()
            .map(|item| {
                T::try_from(item)
                    .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(item), &self))
            })
            .collect()
    }
}
