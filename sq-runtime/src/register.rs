use sq_model::{DomainClassId, SlotId};
use std::ops::Range;

/// The domain class every singly-occurring variable (and every constant)
/// shares — no join-key pre-filtering benefit, but always present so every
/// register has a valid domain.
pub const DEFAULT_DOMAIN: DomainClassId = 0;

/// A runtime value slot: a register index paired with the domain class its
/// value belongs to.
///
/// `spec.md` §3: "Registers grouped by domain class share a common value
/// domain (used by the runtime for join-key pre-filtering)."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub slot: SlotId,
    pub domain: DomainClassId,
}

/// A join-key pre-filtering domain shared by every register in one slot
/// class. Carries no behavior here — the filtering itself is a property of
/// the (out-of-scope) runtime register machine — only the id the compiler
/// and runtime use to recognize which registers share a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainDescriptor {
    pub id: DomainClassId,
}

/// The register pool and domain descriptor table, owned by the runtime for
/// the lifetime of one query (`spec.md` §3 "Lifecycles").
///
/// This is deliberately thin: `getDatabase()` from `spec.md` §6's consumed
/// interfaces is not modeled here, since its target — the triple-store
/// indexes and dictionary — is an out-of-scope external collaborator
/// (`spec.md` §1) with no interface this crate defines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Runtime {
    registers: Vec<Register>,
    domain_count: usize,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            registers: Vec::new(),
            // Domain 0 is always reserved, whether or not any class ever
            // needs a dedicated descriptor.
            domain_count: 1,
        }
    }

    /// Grows the register pool by `n` slots, all starting in the default
    /// domain, and returns their slot range.
    pub fn allocate_registers(&mut self, n: usize) -> Range<SlotId> {
        let base = self.registers.len();
        self.registers
            .extend((base..base + n).map(|slot| Register {
                slot,
                domain: DEFAULT_DOMAIN,
            }));
        base..base + n
    }

    /// Allocates `n` fresh domain descriptors and returns their ids.
    pub fn allocate_domain_descriptions(&mut self, n: usize) -> Range<DomainClassId> {
        let base = self.domain_count;
        self.domain_count += n;
        base..base + n
    }

    /// Attaches `slot`'s register to `domain` (must already have been
    /// allocated via [`Runtime::allocate_domain_descriptions`] or be
    /// [`DEFAULT_DOMAIN`]).
    pub fn set_domain(&mut self, slot: SlotId, domain: DomainClassId) {
        self.registers[slot].domain = domain;
    }

    pub fn register(&self, slot: SlotId) -> Register {
        self.registers[slot]
    }

    pub fn domain_description(&self, id: DomainClassId) -> DomainDescriptor {
        DomainDescriptor { id }
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    /// Component I, `spec.md` §4.I: given the slot allocator's output,
    /// allocate `total + 1` registers, attach a fresh domain descriptor to
    /// every class with at least two members (single-slot classes keep
    /// [`DEFAULT_DOMAIN`]), and return the trailing fallback register — the
    /// "missing-binding fallback" used when a projected variable has no
    /// binding in the compiled tree.
    ///
    /// `domain_classes` iterates deterministically by variable id so two
    /// runs over the same slot allocator output assign identical domain
    /// ids.
    pub fn allocate_from_slot_map<'a, I>(total_slots: usize, domain_classes: I) -> (Self, Register)
    where
        I: IntoIterator<Item = (&'a sq_model::VariableId, &'a Vec<SlotId>)>,
    {
        let mut runtime = Self::new();
        runtime.allocate_registers(total_slots + 1);

        let mut classes: Vec<_> = domain_classes
            .into_iter()
            .filter(|(_, slots)| slots.len() >= 2)
            .collect();
        classes.sort_by_key(|(var, _)| **var);

        for (_, slots) in classes {
            let domain = runtime.allocate_domain_descriptions(1).start;
            for &slot in slots {
                runtime.set_domain(slot, domain);
            }
        }

        let fallback = runtime.register(total_slots);
        (runtime, fallback)
    }
}
