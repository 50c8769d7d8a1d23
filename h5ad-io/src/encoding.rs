use anyhow::{format_err, Error};
use hdf5::types::VarLenUnicode;
use hdf5::Location;
use ndarray::Array1;
use std::str::FromStr;

pub(crate) const ENCODING_TYPE: &str = "encoding-type";
pub(crate) const ENCODING_VERSION: &str = "encoding-version";

pub(crate) fn to_unicode(s: &str) -> Result<VarLenUnicode, Error> {
    VarLenUnicode::from_str(s).map_err(|e| format_err!("cannot store string {:?}: {:?}", s, e))
}

pub(crate) fn unicode_array<S: AsRef<str>>(values: &[S]) -> Result<Array1<VarLenUnicode>, Error> {
    values
        .iter()
        .map(|s| to_unicode(s.as_ref()))
        .collect::<Result<Vec<_>, _>>()
        .map(Array1::from)
}

pub(crate) fn write_str_attr(loc: &Location, key: &str, value: &str) -> Result<(), Error> {
    let v = to_unicode(value)?;
    loc.new_attr::<VarLenUnicode>().create(key)?.write_scalar(&v)?;
    Ok(())
}

/// Tag a group or dataset with its AnnData encoding.
pub(crate) fn write_encoding(loc: &Location, kind: &str, version: &str) -> Result<(), Error> {
    write_str_attr(loc, ENCODING_TYPE, kind)?;
    write_str_attr(loc, ENCODING_VERSION, version)
}

pub(crate) fn read_str_attr(loc: &Location, key: &str) -> Option<String> {
    loc.attr(key)
        .ok()
        .and_then(|a| a.read_scalar::<VarLenUnicode>().ok())
        .map(|s| s.as_str().to_string())
}

pub(crate) fn encoding_type(loc: &Location) -> Option<String> {
    read_str_attr(loc, ENCODING_TYPE)
}
