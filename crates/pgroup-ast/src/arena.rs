//! Owning storage for one compilation unit's declarations.

use std::collections::BTreeMap;

use pgroup_types::Type;

use crate::{AggregateDecl, AggregateId, DeclId, FuncDecl};

/// Owns every aggregate and every synthesized declaration of a compilation
/// unit. Ids handed out by the arena stay valid for its whole lifetime.
///
/// Lookups by id panic on an id from another arena; ids are never forged by
/// callers.
#[derive(Debug, Clone, Default)]
pub struct DeclArena {
    aggregates: Vec<AggregateDecl>,
    by_name: BTreeMap<String, AggregateId>,
    decls: Vec<FuncDecl>,
    /// Declarations later passes must emit, in registration order.
    synthesized: Vec<DeclId>,
}

impl DeclArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an aggregate. Names are unique within the arena.
    pub fn add_aggregate(&mut self, decl: AggregateDecl) -> Result<AggregateId, String> {
        if self.by_name.contains_key(&decl.name) {
            return Err(format!("aggregate `{}` is already declared", decl.name));
        }
        let id = AggregateId(self.aggregates.len() as u32);
        self.by_name.insert(decl.name.clone(), id);
        self.aggregates.push(decl);
        Ok(id)
    }

    pub fn aggregate(&self, id: AggregateId) -> &AggregateDecl {
        &self.aggregates[id.0 as usize]
    }

    fn aggregate_mut(&mut self, id: AggregateId) -> &mut AggregateDecl {
        &mut self.aggregates[id.0 as usize]
    }

    pub fn aggregate_by_name(&self, name: &str) -> Option<AggregateId> {
        self.by_name.get(name).copied()
    }

    /// The aggregate a nominal type refers to, if it is declared here.
    pub fn aggregate_for_type(&self, ty: &Type) -> Option<AggregateId> {
        match ty {
            Type::Named { name, .. } => self.aggregate_by_name(name),
            _ => None,
        }
    }

    pub fn aggregates(&self) -> impl Iterator<Item = (AggregateId, &AggregateDecl)> {
        self.aggregates
            .iter()
            .enumerate()
            .map(|(idx, decl)| (AggregateId(idx as u32), decl))
    }

    /// Layout directive: generated code takes field addresses, so the
    /// aggregate's field order must not be changed by later passes.
    pub fn mark_fixed_layout(&mut self, id: AggregateId) {
        self.aggregate_mut(id).fixed_layout = true;
    }

    /// Record an associated type binding (`Parameter = Float`) on an aggregate.
    pub fn bind_associated_type(&mut self, id: AggregateId, name: impl Into<String>, ty: Type) {
        self.aggregate_mut(id).associated_types.insert(name.into(), ty);
    }

    pub fn associated_type(&self, id: AggregateId, name: &str) -> Option<&Type> {
        self.aggregate(id).associated_types.get(name)
    }

    /// Append a declaration to its owner's members and to the synthesized set.
    ///
    /// An implicit member with the same full name already on the owner is
    /// reused, and its id is returned instead of storing `decl`.
    pub fn add_member(&mut self, decl: FuncDecl) -> DeclId {
        if let Some(existing) = self.find_member(decl.owner, |member| {
            member.implicit && decl.implicit && member.name == decl.name
        }) {
            return existing;
        }
        let owner = decl.owner;
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(decl);
        self.aggregate_mut(owner).members.push(id);
        self.synthesized.push(id);
        id
    }

    pub fn decl(&self, id: DeclId) -> &FuncDecl {
        &self.decls[id.0 as usize]
    }

    /// Members of `owner` in registration order.
    pub fn members(&self, owner: AggregateId) -> impl Iterator<Item = (DeclId, &FuncDecl)> {
        self.aggregate(owner)
            .members
            .iter()
            .map(|id| (*id, self.decl(*id)))
    }

    pub fn find_member(
        &self,
        owner: AggregateId,
        mut predicate: impl FnMut(&FuncDecl) -> bool,
    ) -> Option<DeclId> {
        self.members(owner)
            .find(|(_, decl)| predicate(decl))
            .map(|(id, _)| id)
    }

    pub fn synthesized(&self) -> &[DeclId] {
        &self.synthesized
    }
}
