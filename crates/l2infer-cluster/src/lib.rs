//! TypeClusterer (spec §4.4): splits a symbol into one child per distinct
//! value of its first unnamed field, which becomes that child's
//! `Frame_type`.

use thiserror::Error;
use tracing::{debug, instrument};

use l2infer_model::{field_names, read_field_values, Symbol, VariableFieldError};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("clustering by frame type value {0:02x?} produced an empty message set")]
    EmptyCluster(Vec<u8>),
    #[error(transparent)]
    VariableField(#[from] VariableFieldError),
}

/// Splits `symbol` by the value of its first unnamed `Field`, renaming that
/// field to `Frame_type` in every child. Returns the parent symbol unchanged
/// (as a single-element vec) if it has no unnamed field to cluster on.
#[instrument(skip(symbol), fields(symbol = %symbol.name))]
pub fn cluster_by_frame_type(symbol: Symbol) -> Result<Vec<Symbol>, ClusterError> {
    let Some(frame_type_index) = symbol.layout.position_of(field_names::FIELD) else {
        debug!("no unnamed field present, nothing to cluster on");
        return Ok(vec![symbol]);
    };

    let values = read_field_values(&symbol.layout, &symbol.messages, frame_type_index)?;

    let mut renamed_layout = symbol.layout.clone();
    renamed_layout.fields_mut()[frame_type_index].name = field_names::FRAME_TYPE.to_string();

    let mut buckets: Vec<(Vec<u8>, Vec<usize>)> = Vec::new();
    for (i, value) in values.into_iter().enumerate() {
        match buckets.iter_mut().find(|(v, _)| *v == value) {
            Some((_, indices)) => indices.push(i),
            None => buckets.push((value, vec![i])),
        }
    }

    let mut children = Vec::with_capacity(buckets.len());
    for (value, indices) in buckets {
        if indices.is_empty() {
            return Err(ClusterError::EmptyCluster(value));
        }
        let messages = indices
            .into_iter()
            .map(|i| symbol.messages[i].clone())
            .collect::<Vec<_>>();
        let name = format!("Symbol_{}", hex_encode(&value));
        debug!(child = %name, count = messages.len(), "clustered frame type value");
        children.push(Symbol::new(name, renamed_layout.clone(), messages));
    }

    Ok(children)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2infer_model::{Field, FieldLayout, Message};

    fn msg(bytes: &[u8]) -> Message {
        Message::new(bytes.to_vec(), 0)
    }

    #[test]
    fn splits_into_one_child_per_distinct_frame_type_value() {
        let layout = FieldLayout::new(vec![
            Field::fixed(field_names::FIELD, 1),
            Field::fixed(field_names::ADDRESS, 6),
        ]);
        let messages = vec![
            msg(&[1, 0, 0, 0, 0, 0, 0]),
            msg(&[2, 1, 1, 1, 1, 1, 1]),
            msg(&[1, 2, 2, 2, 2, 2, 2]),
        ];
        let symbol = Symbol::new("Symbol", layout, messages);
        let children = cluster_by_frame_type(symbol).unwrap();
        assert_eq!(children.len(), 2);
        let by_name: Vec<_> = children.iter().map(|c| c.name.clone()).collect();
        assert!(by_name.contains(&"Symbol_01".to_string()));
        assert!(by_name.contains(&"Symbol_02".to_string()));
        for child in &children {
            assert_eq!(child.layout.fields()[0].name, field_names::FRAME_TYPE);
        }
    }

    #[test]
    fn returns_parent_unchanged_when_no_unnamed_field_exists() {
        let layout = FieldLayout::new(vec![Field::fixed(field_names::ADDRESS, 6)]);
        let messages = vec![msg(&[1, 2, 3, 4, 5, 6])];
        let symbol = Symbol::new("Symbol", layout, messages);
        let children = cluster_by_frame_type(symbol).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "Symbol");
    }
}
