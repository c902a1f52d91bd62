//! The mutable, ordered field list every inference stage edits in place.
//!
//! A layout never stores byte offsets directly: a field's start offset is
//! the sum of `max_bytes` of every field before it. Insertion therefore
//! always works by locating the field that currently *covers* the requested
//! offset, splitting it into up to three replacement fields, and splicing
//! those back into the vector — see [`FieldLayout::insert`].

use std::collections::BTreeMap;
use thiserror::Error;

use crate::field_names;

/// A named, size-ranged byte region. Position is implicit: a field's offset
/// is determined by its index within the containing [`FieldLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub min_bytes: usize,
    pub max_bytes: usize,
}

impl Field {
    pub fn new(name: impl Into<String>, min_bytes: usize, max_bytes: usize) -> Self {
        assert!(min_bytes <= max_bytes, "min_bytes must not exceed max_bytes");
        Self {
            name: name.into(),
            min_bytes,
            max_bytes,
        }
    }

    /// A field whose size never varies.
    pub fn fixed(name: impl Into<String>, size: usize) -> Self {
        Self::new(name, size, size)
    }

    pub fn is_fixed(&self) -> bool {
        self.min_bytes == self.max_bytes
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("insert offset {pos} exceeds the layout's maximum size {max}")]
    OffsetBeyondLayout { pos: usize, max: usize },
    #[error("layout is empty, nothing to insert into")]
    EmptyLayout,
}

/// Ordered sequence of fields partitioning a message.
///
/// Invariants maintained by every mutator on this type (see spec §3/§4.1):
/// fields never overlap and together cover `[0, total_max())`; at most one
/// field is named `Frame_type`; at most two are named `Address`.
#[derive(Debug, Clone, Default)]
pub struct FieldLayout {
    fields: Vec<Field>,
}

impl FieldLayout {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut [Field] {
        &mut self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn total_min(&self) -> usize {
        self.fields.iter().map(|f| f.min_bytes).sum()
    }

    pub fn total_max(&self) -> usize {
        self.fields.iter().map(|f| f.max_bytes).sum()
    }

    /// Index of the first field with the given name, if any.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn count_named(&self, name: &str) -> usize {
        self.fields.iter().filter(|f| f.name == name).count()
    }

    /// `(start, end)` max-based byte offsets of every field, in order.
    pub fn offsets(&self) -> Vec<(usize, usize)> {
        let mut start = 0usize;
        let mut out = Vec::with_capacity(self.fields.len());
        for f in &self.fields {
            out.push((start, start + f.max_bytes));
            start += f.max_bytes;
        }
        out
    }

    /// Insert a field of `width` bytes named `name` at byte offset `pos`.
    ///
    /// `shortest_msg_len` is the length of the shortest message currently
    /// associated with this layout's symbol — it decides whether the new
    /// field (and any residuals produced alongside it) are optional.
    ///
    /// Returns the index of the inserted field within the updated layout.
    pub fn insert(
        &mut self,
        pos: usize,
        width: usize,
        name: &str,
        shortest_msg_len: usize,
    ) -> Result<usize, LayoutError> {
        if self.fields.is_empty() {
            return Err(LayoutError::EmptyLayout);
        }
        if pos >= self.total_max() {
            return Err(LayoutError::OffsetBeyondLayout {
                pos,
                max: self.total_max(),
            });
        }

        let force_optional = pos >= shortest_msg_len;

        let mut curr_size = 0usize;
        for i in 0..self.fields.len() {
            let (minsize, maxsize) = (self.fields[i].min_bytes, self.fields[i].max_bytes);
            if curr_size + maxsize <= pos {
                curr_size += maxsize;
                continue;
            }

            let field_is_optional = minsize == 0;
            let mut new_fields: Vec<Field> = Vec::with_capacity(3);
            let mut running_minsize = minsize;

            // leading residual: [curr_size, pos)
            if curr_size != pos {
                let size = pos - curr_size;
                if field_is_optional && force_optional {
                    new_fields.push(Field::new(field_names::FIELD, 0, size));
                } else {
                    new_fields.push(Field::fixed(field_names::FIELD, size));
                }
                running_minsize = update_minsize(running_minsize, size);
            }

            // the inserted field itself
            if field_is_optional && force_optional {
                new_fields.push(Field::new(name, 0, width));
            } else {
                new_fields.push(Field::fixed(name, width));
            }
            let new_field_index = new_fields.len() - 1;

            // consume and delete subsequent fields until width is satisfied
            let mut j = i;
            let mut maxsize = maxsize;
            while curr_size + maxsize < pos + width {
                if j == self.fields.len() - 1 {
                    break; // reached layout end, insertion stops here
                }
                j += 1;
                let (next_min, next_max) = (self.fields[j].min_bytes, self.fields[j].max_bytes);
                running_minsize += next_min;
                maxsize += next_max;
            }

            running_minsize = update_minsize(running_minsize, width);

            // trailing residual: spans any space left in the covering run
            if curr_size + maxsize > pos + width {
                let size_left = (curr_size + maxsize) - (pos + width);
                if field_is_optional && force_optional {
                    new_fields.push(Field::new(field_names::FIELD, 0, size_left));
                } else {
                    new_fields.push(Field::new(field_names::FIELD, running_minsize, size_left));
                }
            }

            self.fields.splice(i..=j, new_fields);
            return Ok(i + new_field_index);
        }

        unreachable!("pos < total_max() guarantees a covering field was found")
    }

    /// Batch insertion: `spec` maps byte offset to `(width, name)`. Runs of
    /// adjacent offsets sharing a name are coalesced into one wider field
    /// inserted at the run's first offset; all other entries are inserted
    /// individually, left to right.
    pub fn insert_many(
        &mut self,
        spec: &BTreeMap<usize, (usize, String)>,
        shortest_msg_len: usize,
    ) -> Result<(), LayoutError> {
        let positions: Vec<usize> = spec.keys().copied().collect();
        let mut idx = 0usize;
        while idx < positions.len() {
            let start_pos = positions[idx];
            let (mut width, name) = spec[&start_pos].clone();
            let mut run_end = idx;
            while run_end + 1 < positions.len()
                && positions[run_end + 1] == positions[run_end] + spec[&positions[run_end]].0
                && spec[&positions[run_end + 1]].1 == name
            {
                run_end += 1;
                width += spec[&positions[run_end]].0;
            }
            self.insert(start_pos, width, &name, shortest_msg_len)?;
            idx = run_end + 1;
        }
        Ok(())
    }

    /// Reconcile the trailing field(s) with the observed `[min_len, max_len]`
    /// range of a symbol's messages, shrinking (or, if the layout already
    /// undershoots, extending) the tail so the layout's cumulative sizes
    /// match exactly.
    pub fn adapt_last(&mut self, min_len: usize, max_len: usize) {
        if self.fields.is_empty() {
            return;
        }

        let mut mins = 0usize;
        let mut maxs = 0usize;
        let mut i = 0usize;
        let mut shrunk = false;

        while i < self.fields.len() {
            let orig_min = self.fields[i].min_bytes;
            let orig_max = self.fields[i].max_bytes;
            let mut newmin = orig_min;
            let mut newmax = orig_max;
            mins += orig_min;
            maxs += orig_max;
            let is_last = i == self.fields.len() - 1;

            if mins > min_len {
                let mindiff = mins - min_len;
                newmin = newmin.saturating_sub(mindiff);
                self.fields[i].min_bytes = newmin;
                if !is_last {
                    for f in self.fields[i + 1..].iter_mut() {
                        f.min_bytes = 0;
                    }
                }
            }

            if maxs > max_len {
                shrunk = true;
                if !is_last {
                    self.fields.truncate(i + 1);
                }
                let maxdiff = maxs - max_len;
                newmax = newmax.saturating_sub(maxdiff);
                if mins <= min_len {
                    let mindiff = min_len - mins;
                    if newmin + mindiff < newmax {
                        newmin += mindiff;
                    } else {
                        newmin = newmax;
                    }
                }
                if newmax == 0 {
                    self.fields.remove(i);
                } else {
                    self.fields[i].min_bytes = newmin;
                    self.fields[i].max_bytes = newmax;
                }
                break;
            }

            i += 1;
        }

        if !shrunk {
            // Cumulative max never reached max_len: the AddressFinder's
            // trailing field undershoots this symbol's own messages (can
            // happen after clustering narrows the message set). Extend the
            // last field rather than leaving the invariant violated.
            if let Some(last) = self.fields.last_mut() {
                let total_max = maxs;
                if total_max < max_len {
                    last.max_bytes += max_len - total_max;
                }
                let total_min = self.fields.iter().map(|f| f.min_bytes).sum::<usize>();
                if total_min < min_len {
                    last.min_bytes += min_len - total_min;
                }
            }
        }
    }
}

fn update_minsize(mins: usize, size: usize) -> usize {
    mins.saturating_sub(size)
}
