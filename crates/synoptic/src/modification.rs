//! Modification catalog, annotation tokenizers, and the resolver that turns
//! raw tokens plus a clean sequence into concrete [`ModificationEntry`] values.
//!
//! Search engines annotate modifications in two shapes: inline mass deltas
//! trailing the residue they modify (`A+15.995BC-2.5D`), or a side-channel
//! comma list (`15M(15.9949)`, `Dehydro 52`, `N-term(42.0106)`). Static
//! modifications are never annotated at all and must be re-derived from the
//! catalog by scanning the clean sequence.

use std::io;
use std::sync::LazyLock;

use fnv::FnvHashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::RowError;

/// Position of a modification relative to the peptide ends.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminus {
    #[default]
    None,
    N,
    C,
}

impl Terminus {
    /// N wins over C for a length-1 peptide, where both apply.
    pub fn classify(position: usize, peptide_len: usize) -> Terminus {
        if position == 1 {
            Terminus::N
        } else if position == peptide_len {
            Terminus::C
        } else {
            Terminus::None
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModificationKind {
    Static,
    Dynamic,
    TerminalStatic,
}

/// One definition from the externally-loaded modification catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModificationDef {
    pub name: String,
    pub mass: f64,
    pub kind: ModificationKind,
    /// Residues this modification targets; `None` for purely terminal mods.
    #[serde(default)]
    pub residues: Option<Vec<char>>,
    /// Which terminus a terminal-static modification binds to.
    #[serde(default)]
    pub terminus: Option<Terminus>,
}

impl ModificationDef {
    fn targets(&self, residue: char) -> bool {
        match &self.residues {
            Some(residues) => residues.contains(&residue),
            None => true,
        }
    }
}

/// Stable identifier of a catalog entry, valid for the lifetime of the run.
pub type CanonicalModificationId = usize;

/// Registry of modification definitions. Loaded once per run and read-only
/// afterwards, except that [`ModificationCatalog::resolve`] may register a new
/// dynamic entry the first time an unseen mass is observed.
#[derive(Debug, Default)]
pub struct ModificationCatalog {
    defs: Vec<ModificationDef>,
    by_name: FnvHashMap<String, CanonicalModificationId>,
}

/// Masses reported by source tools are rounded to 3-4 decimals, so catalog
/// matching has to be looser than exact equality.
pub const MASS_MATCH_TOLERANCE: f64 = 0.005;

impl ModificationCatalog {
    pub fn new(defs: Vec<ModificationDef>) -> Self {
        let mut catalog = Self::default();
        for def in defs {
            catalog.register(def);
        }
        catalog
    }

    /// Load catalog definitions from a JSON array of [`ModificationDef`].
    pub fn from_json_reader<R: io::Read>(reader: R) -> Result<Self, crate::Error> {
        let defs: Vec<ModificationDef> = serde_json::from_reader(reader).map_err(crate::Error::Json)?;
        Ok(Self::new(defs))
    }

    fn register(&mut self, def: ModificationDef) -> CanonicalModificationId {
        let id = self.defs.len();
        self.by_name.insert(def.name.to_ascii_lowercase(), id);
        self.defs.push(def);
        id
    }

    pub fn defs(&self) -> &[ModificationDef] {
        &self.defs
    }

    /// Exact, case-insensitive name lookup.
    pub fn lookup_name(&self, name: &str) -> Option<&ModificationDef> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&id| &self.defs[id])
    }

    /// Map an observed mass to a canonical catalog entry, creating a new
    /// dynamic entry when no existing definition of the requested kind matches
    /// within [`MASS_MATCH_TOLERANCE`].
    pub fn resolve(
        &mut self,
        mass: f64,
        kind: ModificationKind,
        residue: Option<char>,
    ) -> CanonicalModificationId {
        let best = self
            .defs
            .iter()
            .enumerate()
            .filter(|(_, def)| def.kind == kind)
            .filter(|(_, def)| residue.map_or(true, |r| def.targets(r)))
            .map(|(id, def)| (id, (def.mass - mass).abs()))
            .filter(|(_, delta)| *delta <= MASS_MATCH_TOLERANCE)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((id, _)) => id,
            None => {
                let def = ModificationDef {
                    name: format!("{:+.4}", mass),
                    mass,
                    kind: ModificationKind::Dynamic,
                    residues: residue.map(|r| vec![r]),
                    terminus: None,
                };
                log::debug!("registering catalog entry for unseen mass {:+.4}", mass);
                self.register(def)
            }
        }
    }

    fn static_defs(&self) -> impl Iterator<Item = &ModificationDef> {
        self.defs
            .iter()
            .filter(|def| def.kind == ModificationKind::Static)
    }

    fn terminal_static_defs(&self) -> impl Iterator<Item = &ModificationDef> {
        self.defs
            .iter()
            .filter(|def| def.kind == ModificationKind::TerminalStatic)
    }
}

/// A concrete modification placed on one residue of one PSM.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ModificationEntry {
    pub mass: f64,
    pub residue: u8,
    /// 1-based position within the clean sequence.
    pub position: usize,
    pub terminus: Terminus,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenValue {
    Mass(f64),
    Name(String),
}

/// Raw (mass-or-name, position, terminus-hint) triple produced by a tokenizer,
/// before catalog resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct ModToken {
    pub value: TokenValue,
    /// 1-based position within the clean sequence.
    pub position: usize,
    pub terminus: Terminus,
}

/// Result of splitting an inline-annotated sequence into residues and tokens.
#[derive(Debug, Default)]
pub struct TokenizedSequence {
    pub clean_sequence: String,
    pub tokens: Vec<ModToken>,
    pub errors: Vec<RowError>,
}

/// Tokenize an inline-annotated sequence such as `A+15.995BC-2.5D`.
///
/// A mass always trails the residue it modifies, so a pending mass buffer is
/// finalized when the next residue letter arrives (or at end of string). A
/// mass appearing before any residue binds to position 1, the N-terminus.
/// Characters other than letters, sign, digit, and dot are ignored.
pub fn tokenize_inline(annotated: &str) -> TokenizedSequence {
    let mut out = TokenizedSequence::default();
    let mut buffer = String::new();
    let mut accumulating = false;

    let finalize = |buffer: &mut String, out: &mut TokenizedSequence| {
        let position = out.clean_sequence.len().max(1);
        match buffer.parse::<f64>() {
            Ok(mass) => out.tokens.push(ModToken {
                value: TokenValue::Mass(mass),
                position,
                terminus: if out.clean_sequence.is_empty() {
                    Terminus::N
                } else {
                    Terminus::None
                },
            }),
            Err(_) => out.errors.push(RowError::MalformedModEntry(buffer.clone())),
        }
        buffer.clear();
    };

    for c in annotated.chars() {
        if c.is_ascii_alphabetic() {
            if accumulating {
                finalize(&mut buffer, &mut out);
                accumulating = false;
            }
            out.clean_sequence.push(c.to_ascii_uppercase());
        } else if c == '+' || c == '-' || c.is_ascii_digit() {
            buffer.push(c);
            accumulating = true;
        } else if c == '.' && accumulating {
            buffer.push(c);
        }
        // everything else (separators, flanking dots) is ignored
    }
    if accumulating {
        finalize(&mut buffer, &mut out);
    }
    out
}

static FLANKED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z-])\.(.+)\.([A-Za-z-])$").unwrap());

/// Reduce a side-channel peptide field to its clean sequence: drop
/// `K.PEPTIDER.A` flanking-residue notation (`-` marks a protein terminus),
/// then any remaining non-letter characters. Side-channel residue numbers
/// refer to this stripped sequence.
pub fn clean_peptide(peptide: &str) -> String {
    let core = match FLANKED.captures(peptide) {
        Some(caps) => caps.get(2).map_or(peptide, |m| m.as_str()),
        None => peptide,
    };
    core.chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

static RESIDUE_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([A-Za-z])\(([^)]+)\)$").unwrap());
static TERMINAL_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)([NC])-term\(([^)]+)\)$").unwrap());
static NAMED_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9_>-]*)\s+(\d+)$").unwrap());

/// Tokenize a side-channel comma list such as
/// `15M(15.9949), Dehydro 52, N-term(42.0106)`.
///
/// Entries matching none of the three forms are reported and skipped; the
/// rest of the PSM is still processed.
pub fn tokenize_side_channel(list: &str, clean_len: usize) -> (Vec<ModToken>, Vec<RowError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if let Some(caps) = RESIDUE_ENTRY.captures(entry) {
            let position = caps[1].parse::<usize>().unwrap_or(0);
            match caps[3].trim().parse::<f64>() {
                Ok(mass) => tokens.push(ModToken {
                    value: TokenValue::Mass(mass),
                    position,
                    terminus: Terminus::None,
                }),
                Err(_) => errors.push(RowError::MalformedModEntry(entry.into())),
            }
        } else if let Some(caps) = TERMINAL_ENTRY.captures(entry) {
            let n_term = caps[1].eq_ignore_ascii_case("N");
            match caps[2].trim().parse::<f64>() {
                Ok(mass) => tokens.push(ModToken {
                    value: TokenValue::Mass(mass),
                    position: if n_term { 1 } else { clean_len },
                    terminus: if n_term { Terminus::N } else { Terminus::C },
                }),
                Err(_) => errors.push(RowError::MalformedModEntry(entry.into())),
            }
        } else if let Some(caps) = NAMED_ENTRY.captures(entry) {
            tokens.push(ModToken {
                value: TokenValue::Name(caps[1].into()),
                position: caps[2].parse::<usize>().unwrap_or(0),
                terminus: Terminus::None,
            });
        } else {
            errors.push(RowError::MalformedModEntry(entry.into()));
        }
    }
    (tokens, errors)
}

/// Resolve raw tokens into [`ModificationEntry`] values and independently
/// re-derive every static modification from the catalog.
///
/// Static mods are never annotated by the source tool: every position of the
/// clean sequence is scanned against the catalog's static definitions, and
/// the first and last positions are additionally checked against terminal
/// statics. A terminal residue matched by both a general static and a
/// terminal static collects both entries (double modification of one terminus
/// is real biochemistry, e.g. double COOH labeling).
pub fn resolve_modifications(
    tokens: &[ModToken],
    clean_sequence: &str,
    catalog: &ModificationCatalog,
) -> (Vec<ModificationEntry>, Vec<RowError>) {
    let mut entries = Vec::new();
    let mut errors = Vec::new();
    let seq = clean_sequence.as_bytes();
    let len = seq.len();

    for token in tokens {
        let position = token.position.max(1);
        if position > len {
            errors.push(RowError::MalformedModEntry(format!(
                "position {} outside peptide of length {}",
                token.position, len
            )));
            continue;
        }
        let mass = match &token.value {
            TokenValue::Mass(mass) => *mass,
            TokenValue::Name(name) => match catalog.lookup_name(name) {
                Some(def) => def.mass,
                None => {
                    errors.push(RowError::UnknownModification(name.clone()));
                    continue;
                }
            },
        };
        let terminus = match token.terminus {
            Terminus::None => Terminus::classify(position, len),
            hint => hint,
        };
        entries.push(ModificationEntry {
            mass,
            residue: seq[position - 1],
            position,
            terminus,
        });
    }

    for def in catalog.static_defs() {
        for (i, &residue) in seq.iter().enumerate() {
            if def.targets(residue as char) {
                entries.push(ModificationEntry {
                    mass: def.mass,
                    residue,
                    position: i + 1,
                    terminus: Terminus::classify(i + 1, len),
                });
            }
        }
    }

    if len > 0 {
        for def in catalog.terminal_static_defs() {
            let (position, terminus) = match def.terminus {
                Some(Terminus::C) => (len, Terminus::C),
                // terminal statics without an explicit side default to N
                _ => (1, Terminus::N),
            };
            if def.targets(seq[position - 1] as char) {
                entries.push(ModificationEntry {
                    mass: def.mass,
                    residue: seq[position - 1],
                    position,
                    terminus,
                });
            }
        }
    }

    entries.sort_by_key(|e| e.position);
    (entries, errors)
}

pub fn total_modification_mass(entries: &[ModificationEntry]) -> f64 {
    entries.iter().map(|e| e.mass).sum()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inline_masses_trail_their_residue() {
        let tok = tokenize_inline("A+15.995BC-2.5D");
        assert_eq!(tok.clean_sequence, "ABCD");
        assert!(tok.errors.is_empty());
        assert_eq!(
            tok.tokens,
            vec![
                ModToken {
                    value: TokenValue::Mass(15.995),
                    position: 1,
                    terminus: Terminus::None,
                },
                ModToken {
                    value: TokenValue::Mass(-2.5),
                    position: 3,
                    terminus: Terminus::None,
                },
            ]
        );
    }

    #[test]
    fn inline_mass_before_first_residue_is_n_terminal() {
        let tok = tokenize_inline("+42.0106PEPTIDE");
        assert_eq!(tok.clean_sequence, "PEPTIDE");
        assert_eq!(tok.tokens.len(), 1);
        assert_eq!(tok.tokens[0].position, 1);
        assert_eq!(tok.tokens[0].terminus, Terminus::N);
    }

    #[test]
    fn inline_trailing_mass_binds_to_last_residue() {
        let tok = tokenize_inline("PEPTIDEK+8.014");
        assert_eq!(tok.clean_sequence, "PEPTIDEK");
        assert_eq!(tok.tokens[0].position, 8);
    }

    #[test]
    fn inline_garbage_is_ignored() {
        let tok = tokenize_inline("PE*P_T!IDE");
        assert_eq!(tok.clean_sequence, "PEPTIDE");
        assert!(tok.tokens.is_empty());
        assert!(tok.errors.is_empty());
    }

    #[test]
    fn flanked_peptide_is_cleaned() {
        assert_eq!(clean_peptide("K.PEPTIDER.A"), "PEPTIDER");
        assert_eq!(clean_peptide("-.MPEPTIDE.K"), "MPEPTIDE");
        assert_eq!(clean_peptide("peptide"), "PEPTIDE");
        assert_eq!(clean_peptide("PEP*TIDE"), "PEPTIDE");
    }

    #[test]
    fn side_channel_forms() {
        let (tokens, errors) =
            tokenize_side_channel("15M(15.9949), Dehydro 52, N-term(42.0106)", 60);
        assert!(errors.is_empty());
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].value, TokenValue::Mass(15.9949));
        assert_eq!(tokens[0].position, 15);
        assert_eq!(tokens[1].value, TokenValue::Name("Dehydro".into()));
        assert_eq!(tokens[1].position, 52);
        assert_eq!(tokens[2].position, 1);
        assert_eq!(tokens[2].terminus, Terminus::N);

        let (tokens, _) = tokenize_side_channel("C-term(14.0157)", 9);
        assert_eq!(tokens[0].position, 9);
        assert_eq!(tokens[0].terminus, Terminus::C);
    }

    #[test]
    fn side_channel_bad_entry_is_skipped_not_fatal() {
        let (tokens, errors) = tokenize_side_channel("15M(abc), 3C(57.0215)", 20);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].position, 3);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], RowError::MalformedModEntry(_)));
    }

    fn test_catalog() -> ModificationCatalog {
        ModificationCatalog::new(vec![
            ModificationDef {
                name: "Carbamidomethyl".into(),
                mass: 57.02146,
                kind: ModificationKind::Static,
                residues: Some(vec!['C']),
                terminus: None,
            },
            ModificationDef {
                name: "Dehydro".into(),
                mass: -1.00794,
                kind: ModificationKind::Dynamic,
                residues: Some(vec!['C']),
                terminus: None,
            },
            ModificationDef {
                name: "Methyl-C-term".into(),
                mass: 14.01565,
                kind: ModificationKind::TerminalStatic,
                residues: None,
                terminus: Some(Terminus::C),
            },
        ])
    }

    #[test]
    fn static_mods_rederived_from_clean_sequence() {
        let catalog = test_catalog();
        let (entries, errors) = resolve_modifications(&[], "ACDCK", &catalog);
        assert!(errors.is_empty());
        // two Cys statics plus the C-terminal static on K
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].position, 2);
        assert_eq!(entries[1].position, 4);
        assert_eq!(entries[2].position, 5);
        assert_eq!(entries[2].terminus, Terminus::C);
    }

    #[test]
    fn terminal_static_stacks_with_general_static() {
        let catalog = test_catalog();
        // C-terminal residue is Cys: both the Cys static and the terminal
        // static land on position 4
        let (entries, _) = resolve_modifications(&[], "PEPC", &catalog);
        let on_terminus: Vec<_> = entries.iter().filter(|e| e.position == 4).collect();
        assert_eq!(on_terminus.len(), 2);
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        let catalog = test_catalog();
        let tokens = vec![ModToken {
            value: TokenValue::Name("dehydro".into()),
            position: 2,
            terminus: Terminus::None,
        }];
        let (entries, errors) = resolve_modifications(&tokens, "ACD", &catalog);
        assert!(errors.is_empty());
        assert!(entries
            .iter()
            .any(|e| e.position == 2 && (e.mass + 1.00794).abs() < 1E-9));
    }

    #[test]
    fn unknown_name_is_reported_and_skipped() {
        let catalog = test_catalog();
        let tokens = vec![ModToken {
            value: TokenValue::Name("Phospho".into()),
            position: 1,
            terminus: Terminus::None,
        }];
        let (entries, errors) = resolve_modifications(&tokens, "STY", &catalog);
        assert!(entries.is_empty());
        assert_eq!(errors, vec![RowError::UnknownModification("Phospho".into())]);
    }

    #[test]
    fn resolve_registers_unseen_mass() {
        let mut catalog = test_catalog();
        let before = catalog.defs().len();
        let id = catalog.resolve(79.96633, ModificationKind::Dynamic, Some('S'));
        assert_eq!(catalog.defs().len(), before + 1);
        // second resolution of the same mass reuses the new entry
        assert_eq!(catalog.resolve(79.9663, ModificationKind::Dynamic, Some('S')), id);
    }

    #[test]
    fn resolve_matches_within_tolerance() {
        let mut catalog = test_catalog();
        let id = catalog.resolve(57.0215, ModificationKind::Static, Some('C'));
        assert_eq!(catalog.defs()[id].name, "Carbamidomethyl");
    }
}
