//! Material System with Pair-wise Combine Rules
//!
//! Provides friction and restitution lookup per body pair, with configurable
//! combine rules and pair-specific overrides. Contact constraints blend
//! materials through this table when a pair is created; the `CreatingPair`
//! event may then override the blended values per pair.
//!
//! Default blending follows the contact model: friction combines as the
//! geometric mean `sqrt(f_a * f_b)` and restitution as `max(e_a, e_b)`.
//! Restitution only engages above the solver's relative-velocity threshold.

/// Material ID (u16 for compact storage)
pub type MaterialId = u16;

/// Default material ID
pub const DEFAULT_MATERIAL: MaterialId = 0;

/// Combine rule for friction/restitution when two materials interact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CombineRule {
    /// Average of two values
    Average,
    /// Minimum of two values
    Min,
    /// Maximum of two values
    Max,
    /// Multiply two values
    Multiply,
    /// Geometric mean `sqrt(a * b)`, the default for friction
    #[default]
    GeometricMean,
}

impl CombineRule {
    /// Apply the combine rule to two values.
    #[inline]
    pub fn apply(&self, a: f32, b: f32) -> f32 {
        match self {
            CombineRule::Average => 0.5 * (a + b),
            CombineRule::Min => a.min(b),
            CombineRule::Max => a.max(b),
            CombineRule::Multiply => a * b,
            CombineRule::GeometricMean => (a * b).sqrt(),
        }
    }
}

/// Physics material definition.
#[derive(Clone, Copy, Debug)]
pub struct PhysicsMaterial {
    /// Material identifier
    pub id: MaterialId,
    /// Friction coefficient
    pub friction: f32,
    /// Restitution (bounciness)
    pub restitution: f32,
    /// Friction combine rule
    pub friction_combine: CombineRule,
    /// Restitution combine rule
    pub restitution_combine: CombineRule,
}

impl PhysicsMaterial {
    /// Create a new material with given properties.
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            id: DEFAULT_MATERIAL,
            friction,
            restitution,
            friction_combine: CombineRule::GeometricMean,
            restitution_combine: CombineRule::Max,
        }
    }

    /// Set combine rules.
    pub fn with_combine_rules(mut self, friction: CombineRule, restitution: CombineRule) -> Self {
        self.friction_combine = friction;
        self.restitution_combine = restitution;
        self
    }
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self::new(0.5, 0.0)
    }
}

/// Pair override entry
#[derive(Clone, Copy, Debug)]
struct PairOverride {
    mat_a: MaterialId,
    mat_b: MaterialId,
    friction: f32,
    restitution: f32,
}

/// Blended material result for a contact pair. Mutable during the
/// `CreatingPair` event so subscribers can override pair behavior (the
/// character controller zeroes friction on its own pairs this way).
#[derive(Clone, Copy, Debug)]
pub struct CombinedMaterial {
    /// Blended friction
    pub friction: f32,
    /// Blended restitution
    pub restitution: f32,
}

impl Default for CombinedMaterial {
    fn default() -> Self {
        Self {
            friction: 0.5,
            restitution: 0.0,
        }
    }
}

/// Material pair lookup table.
pub struct MaterialTable {
    /// Registered materials (indexed by MaterialId)
    materials: Vec<PhysicsMaterial>,
    /// Pair-specific overrides
    pair_overrides: Vec<PairOverride>,
}

impl MaterialTable {
    /// Create a new material table with a default material at id 0.
    pub fn new() -> Self {
        let mut table = Self {
            materials: Vec::new(),
            pair_overrides: Vec::new(),
        };
        table.register(PhysicsMaterial::default());
        table
    }

    /// Register a material, returns its ID.
    pub fn register(&mut self, material: PhysicsMaterial) -> MaterialId {
        let id = self.materials.len() as MaterialId;
        let mut mat = material;
        mat.id = id;
        self.materials.push(mat);
        id
    }

    /// Get material by ID (falls back to the default material).
    pub fn get(&self, id: MaterialId) -> &PhysicsMaterial {
        self.materials
            .get(id as usize)
            .unwrap_or(&self.materials[0])
    }

    /// Set a pair-specific override.
    pub fn set_pair_override(
        &mut self,
        mat_a: MaterialId,
        mat_b: MaterialId,
        friction: f32,
        restitution: f32,
    ) {
        let (a, b) = if mat_a <= mat_b {
            (mat_a, mat_b)
        } else {
            (mat_b, mat_a)
        };

        if let Some(p) = self
            .pair_overrides
            .iter_mut()
            .find(|p| p.mat_a == a && p.mat_b == b)
        {
            p.friction = friction;
            p.restitution = restitution;
        } else {
            self.pair_overrides.push(PairOverride {
                mat_a: a,
                mat_b: b,
                friction,
                restitution,
            });
        }
    }

    /// Blend materials for a contact pair.
    pub fn combine(&self, mat_a: MaterialId, mat_b: MaterialId) -> CombinedMaterial {
        let (a, b) = if mat_a <= mat_b {
            (mat_a, mat_b)
        } else {
            (mat_b, mat_a)
        };

        if let Some(p) = self
            .pair_overrides
            .iter()
            .find(|p| p.mat_a == a && p.mat_b == b)
        {
            return CombinedMaterial {
                friction: p.friction,
                restitution: p.restitution,
            };
        }

        let mat_a = self.get(a);
        let mat_b = self.get(b);

        let friction_rule = combine_rule_priority(mat_a.friction_combine, mat_b.friction_combine);
        let restitution_rule =
            combine_rule_priority(mat_a.restitution_combine, mat_b.restitution_combine);

        CombinedMaterial {
            friction: friction_rule.apply(mat_a.friction, mat_b.friction),
            restitution: restitution_rule.apply(mat_a.restitution, mat_b.restitution),
        }
    }

    /// Number of registered materials.
    #[inline]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Priority: Max > Multiply > GeometricMean > Average > Min
fn combine_rule_priority(a: CombineRule, b: CombineRule) -> CombineRule {
    fn priority(r: CombineRule) -> u8 {
        match r {
            CombineRule::Min => 0,
            CombineRule::Average => 1,
            CombineRule::GeometricMean => 2,
            CombineRule::Multiply => 3,
            CombineRule::Max => 4,
        }
    }

    if priority(a) >= priority(b) {
        a
    } else {
        b
    }
}
