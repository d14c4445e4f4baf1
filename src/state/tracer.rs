//! Named chemical sub-pools carried on the mesh.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chemistry::Species;

/// Physical phase of a sub-pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Dissolved in the water column
    Dissolved,
    /// Attached to sinking particles
    Particulate,
}

/// A chemical sub-pool with its own concentration field (g/m³).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tracer {
    // Phosphorus
    Phosphate,
    LabileDop,
    RefractoryDop,
    LabilePop,
    RefractoryPop,
    // Nitrogen
    Ammonium,
    Nitrate,
    LabileDon,
    RefractoryDon,
    LabilePon,
    RefractoryPon,
    // Silica
    Silicate,
    BiogenicSilica,
    // Carbon
    LabilePoc,
    RefractoryPoc,
    ReactivePoc,
    LabileDoc,
    ExudedDoc,
    ReactiveDoc,
    RefractoryDoc,
    // Oxygen
    Oxygen,
    OxygenEquivalents,
}

impl Tracer {
    /// Every tracer, grouped by species.
    pub const ALL: [Tracer; 22] = [
        Tracer::Phosphate,
        Tracer::LabileDop,
        Tracer::RefractoryDop,
        Tracer::LabilePop,
        Tracer::RefractoryPop,
        Tracer::Ammonium,
        Tracer::Nitrate,
        Tracer::LabileDon,
        Tracer::RefractoryDon,
        Tracer::LabilePon,
        Tracer::RefractoryPon,
        Tracer::Silicate,
        Tracer::BiogenicSilica,
        Tracer::LabilePoc,
        Tracer::RefractoryPoc,
        Tracer::ReactivePoc,
        Tracer::LabileDoc,
        Tracer::ExudedDoc,
        Tracer::ReactiveDoc,
        Tracer::RefractoryDoc,
        Tracer::Oxygen,
        Tracer::OxygenEquivalents,
    ];

    /// Species owning this sub-pool.
    pub fn species(self) -> Species {
        use Tracer::*;
        match self {
            Phosphate | LabileDop | RefractoryDop | LabilePop | RefractoryPop => {
                Species::Phosphorus
            }
            Ammonium | Nitrate | LabileDon | RefractoryDon | LabilePon | RefractoryPon => {
                Species::Nitrogen
            }
            Silicate | BiogenicSilica => Species::Silica,
            LabilePoc | RefractoryPoc | ReactivePoc | LabileDoc | ExudedDoc | ReactiveDoc
            | RefractoryDoc => Species::Carbon,
            Oxygen | OxygenEquivalents => Species::Oxygen,
        }
    }

    /// Dissolved or particulate.
    pub fn phase(self) -> Phase {
        use Tracer::*;
        match self {
            LabilePop | RefractoryPop | LabilePon | RefractoryPon | BiogenicSilica | LabilePoc
            | RefractoryPoc | ReactivePoc => Phase::Particulate,
            _ => Phase::Dissolved,
        }
    }

    /// Check if the sub-pool settles.
    pub fn is_particulate(self) -> bool {
        self.phase() == Phase::Particulate
    }

    /// Conventional short code.
    pub fn code(self) -> &'static str {
        use Tracer::*;
        match self {
            Phosphate => "PO4",
            LabileDop => "LDOP",
            RefractoryDop => "RDOP",
            LabilePop => "LPOP",
            RefractoryPop => "RPOP",
            Ammonium => "NH4",
            Nitrate => "NO23",
            LabileDon => "LDON",
            RefractoryDon => "RDON",
            LabilePon => "LPON",
            RefractoryPon => "RPON",
            Silicate => "SiO3",
            BiogenicSilica => "BSi",
            LabilePoc => "LPOC",
            RefractoryPoc => "RPOC",
            ReactivePoc => "RePOC",
            LabileDoc => "LDOC",
            ExudedDoc => "ExDOC",
            ReactiveDoc => "ReDOC",
            RefractoryDoc => "RDOC",
            Oxygen => "DO",
            OxygenEquivalents => "EqDO",
        }
    }

    /// Look up a tracer by its short code.
    pub fn from_code(code: &str) -> Option<Tracer> {
        Tracer::ALL.into_iter().find(|t| t.code() == code)
    }
}

impl fmt::Display for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
