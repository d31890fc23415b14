use crate::{
    Dimensions,
    error::{ModelError, ModelResult},
};

/// Parses one `key=value` or `key:value` pair, splitting at the first separator.
pub fn parse_dim(item: &str) -> ModelResult<(String, String)> {
    let item = item.trim();
    let idx = item
        .find(['=', ':'])
        .ok_or_else(|| ModelError::MalformedDimension(item.to_string()))?;
    let (key, value) = (item[..idx].trim(), item[idx + 1..].trim());
    if key.is_empty() {
        return Err(ModelError::MalformedDimension(item.to_string()));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parses a comma-separated dimension list into `into`.
///
/// Both `k1=v1,k2=v2` and `k1:v1,k2:v2` are accepted and may be mixed.
/// A later occurrence of a key replaces an earlier one. Empty items are skipped.
pub fn parse_dims_into(list: &str, into: &mut Dimensions) -> ModelResult<()> {
    for item in list.split(',').filter(|s| !s.trim().is_empty()) {
        let (k, v) = parse_dim(item)?;
        into.set(k, v);
    }
    Ok(())
}

/// Parses a comma-separated dimension list.
pub fn parse_dims(list: &str) -> ModelResult<Dimensions> {
    let mut dims = Dimensions::new();
    parse_dims_into(list, &mut dims)?;
    Ok(dims)
}
