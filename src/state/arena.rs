//! Arena of named concentration fields owned by the reactor.
//!
//! Components never hold on to fields between steps. During a step they
//! receive `&FieldArena` for reading and write their rates into a separate
//! tendency arena with the same keys.

use std::collections::BTreeMap;

use super::field::Field;
use super::tracer::Tracer;
use crate::error::{EngineError, Result};

/// Concentration fields keyed by tracer, all of one (node × layer) shape.
#[derive(Clone, Debug)]
pub struct FieldArena {
    n_nodes: usize,
    n_layers: usize,
    fields: BTreeMap<Tracer, Field>,
}

impl FieldArena {
    /// Empty arena for a given shape.
    pub fn new(n_nodes: usize, n_layers: usize) -> Self {
        Self {
            n_nodes,
            n_layers,
            fields: BTreeMap::new(),
        }
    }

    /// Arena holding every tracer at a uniform concentration.
    pub fn uniform(n_nodes: usize, n_layers: usize, tracers: &[Tracer], value: f64) -> Self {
        let mut arena = Self::new(n_nodes, n_layers);
        for &tracer in tracers {
            arena
                .fields
                .insert(tracer, Field::constant(n_nodes, n_layers, value));
        }
        arena
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, tracer: Tracer, field: Field) -> Result<()> {
        field.check_shape(tracer.code(), self.n_nodes, self.n_layers)?;
        self.fields.insert(tracer, field);
        Ok(())
    }

    /// Builder form of [`Self::insert`].
    pub fn with(mut self, tracer: Tracer, field: Field) -> Result<Self> {
        self.insert(tracer, field)?;
        Ok(self)
    }

    /// Number of nodes.
    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    /// Number of layers.
    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    /// Check if a tracer is present.
    pub fn contains(&self, tracer: Tracer) -> bool {
        self.fields.contains_key(&tracer)
    }

    /// Borrow a field.
    pub fn get(&self, tracer: Tracer) -> Result<&Field> {
        self.fields
            .get(&tracer)
            .ok_or(EngineError::MissingTracer(tracer))
    }

    /// Borrow a field mutably.
    pub fn get_mut(&mut self, tracer: Tracer) -> Result<&mut Field> {
        self.fields
            .get_mut(&tracer)
            .ok_or(EngineError::MissingTracer(tracer))
    }

    /// Value at (node, layer), zero for absent tracers.
    #[inline]
    pub fn value(&self, tracer: Tracer, node: usize, layer: usize) -> f64 {
        self.fields.get(&tracer).map_or(0.0, |f| f.get(node, layer))
    }

    /// Add to a tracer's value, inserting a zero field on first use.
    pub fn add(&mut self, tracer: Tracer, node: usize, layer: usize, value: f64) {
        let (n, l) = (self.n_nodes, self.n_layers);
        self.fields
            .entry(tracer)
            .or_insert_with(|| Field::zeros(n, l))
            .add(node, layer, value);
    }

    /// Move `amount` from one tracer to another at (node, layer).
    #[inline]
    pub fn transfer(&mut self, source: Tracer, sink: Tracer, node: usize, layer: usize, amount: f64) {
        self.add(source, node, layer, -amount);
        self.add(sink, node, layer, amount);
    }

    /// Tracers present, in key order.
    pub fn tracers(&self) -> impl Iterator<Item = Tracer> + '_ {
        self.fields.keys().copied()
    }

    /// Iterate over (tracer, field).
    pub fn iter(&self) -> impl Iterator<Item = (Tracer, &Field)> {
        self.fields.iter().map(|(&t, f)| (t, f))
    }

    /// Iterate mutably over (tracer, field).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Tracer, &mut Field)> {
        self.fields.iter_mut().map(|(&t, f)| (t, f))
    }

    /// Arena with the same keys and zero values.
    pub fn zeros_like(&self) -> Self {
        Self {
            n_nodes: self.n_nodes,
            n_layers: self.n_layers,
            fields: self
                .fields
                .keys()
                .map(|&t| (t, Field::zeros(self.n_nodes, self.n_layers)))
                .collect(),
        }
    }

    /// Add a scaled arena: self <- self + c * other, for keys present in self.
    pub fn axpy(&mut self, c: f64, other: &FieldArena) {
        for (tracer, field) in self.fields.iter_mut() {
            if let Some(rate) = other.fields.get(tracer) {
                field.axpy(c, rate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_checks_shape() {
        let mut arena = FieldArena::new(4, 2);
        assert!(arena.insert(Tracer::Phosphate, Field::zeros(4, 2)).is_ok());
        assert!(arena.insert(Tracer::Ammonium, Field::zeros(3, 2)).is_err());
        assert!(arena.contains(Tracer::Phosphate));
        assert!(matches!(
            arena.get(Tracer::Oxygen),
            Err(EngineError::MissingTracer(Tracer::Oxygen))
        ));
    }

    #[test]
    fn test_axpy_merges_rates() {
        let mut arena = FieldArena::uniform(2, 2, &[Tracer::Oxygen, Tracer::Nitrate], 1.0);
        let mut rates = arena.zeros_like();
        rates.add(Tracer::Oxygen, 0, 0, 2.0);
        rates.add(Tracer::Silicate, 0, 0, 5.0);
        arena.axpy(0.5, &rates);
        assert_eq!(arena.value(Tracer::Oxygen, 0, 0), 2.0);
        assert_eq!(arena.value(Tracer::Oxygen, 1, 0), 1.0);
        assert!(!arena.contains(Tracer::Silicate));
    }
}
