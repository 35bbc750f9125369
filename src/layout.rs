//! Layout of the unknown vector.
use crate::emit::SourceWriter;
use crate::error::DeclarationErrorKind;
use crate::variable::{IntegrationVariable, SpaceDimension};
use log::debug;
use rustc_hash::FxHashMap;
use std::convert::TryFrom;
use std::fmt;
use std::fmt::Write;
use std::ops::Range;

/// Position of one variable in the unknown vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    pub variable: IntegrationVariable,
    pub offset: usize,
    pub block_size: usize,
    /// Components of a single array element.
    pub components: usize,
}

impl LayoutEntry {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.block_size
    }

    pub fn name(&self) -> &str {
        self.variable.name()
    }
}

/// The component of a variable stored at a given index of the unknown vector.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ComponentLocation<'a> {
    pub variable: &'a str,
    pub array_index: usize,
    pub component: usize,
}

/// Offsets and block sizes of all integration variables, in declaration order.
///
/// The blocks partition `[0, total_size)` without gaps or overlaps. A layout is computed once
/// per modelling hypothesis and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVectorLayout {
    space_dimension: SpaceDimension,
    entries: Vec<LayoutEntry>,
    index: FxHashMap<String, usize>,
    total_size: usize,
}

impl UnknownVectorLayout {
    pub fn space_dimension(&self) -> SpaceDimension {
        self.space_dimension
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&LayoutEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn offset(&self, name: &str) -> Option<usize> {
        self.entry(name).map(|entry| entry.offset)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Finds the variable, array element and component stored at `index`.
    pub fn locate(&self, index: usize) -> Option<ComponentLocation<'_>> {
        // Offsets are sorted, so the owning block is the last one starting at or before `index`
        let position = self.entries.partition_point(|entry| entry.offset <= index);
        let entry = self.entries.get(position.checked_sub(1)?)?;
        let local = index - entry.offset;
        if local >= entry.block_size {
            return None;
        }
        Some(ComponentLocation {
            variable: entry.name(),
            array_index: local / entry.components,
            component: local % entry.components,
        })
    }

    /// Writes one `constexpr` offset per variable, followed by the total size `N`.
    pub fn emit_offsets(&self, w: &mut SourceWriter) -> fmt::Result {
        w.comment("offsets of the integration variables in the unknown vector")?;
        for entry in &self.entries {
            writeln!(w, "static constexpr unsigned short {}_offset = {};", entry.name(), entry.offset)?;
        }
        writeln!(w, "static constexpr unsigned short N = {};", self.total_size)
    }
}

/// Assigns offsets to `variables` in order, for the given space dimension.
///
/// Fails only if `space_dimension` is not one of 1, 2 or 3.
pub fn plan(variables: &[IntegrationVariable], space_dimension: usize) -> Result<UnknownVectorLayout, DeclarationErrorKind> {
    let dim = SpaceDimension::try_from(space_dimension)?;

    let mut entries = Vec::with_capacity(variables.len());
    let mut index = FxHashMap::default();
    let mut offset = 0;
    for variable in variables {
        let block_size = variable.block_size(dim);
        index.insert(variable.name().to_string(), entries.len());
        entries.push(LayoutEntry {
            variable: variable.clone(),
            offset,
            block_size,
            components: variable.components(dim),
        });
        offset += block_size;
    }

    debug!(
        "Planned unknown vector of size {} for {} variables in dimension {}",
        offset,
        entries.len(),
        dim
    );

    Ok(UnknownVectorLayout {
        space_dimension: dim,
        entries,
        index,
        total_size: offset,
    })
}
