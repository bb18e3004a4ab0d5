//! Single-threaded driver: stream rows in, normalize each independently,
//! then rank, estimate FDR, and emit the synopsis in one bulk pass.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::delta::DeltaCorrector;
use crate::fdr::assign_fdr;
use crate::modification::{
    self, resolve_modifications, ModificationCatalog, ModificationKind, TokenValue,
};
use crate::psm::NormalizedMatch;
use crate::rank::assign_ranks;
use crate::reader::{ColumnSchema, ModAnnotation, ParsedRow, SourceOptions};
use crate::reconcile::MassReconciler;
use crate::synopsis::write_synopsis;
use crate::{mass, Error, MessageCollector, RowError};

/// Counters and collected messages from one processed file.
#[derive(Debug, Default)]
pub struct ProcessingSummary {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub rows_written: usize,
    pub mass_mismatches: u64,
    pub implausible_deltas: u64,
    pub messages: MessageCollector,
}

/// One-file processor. Owns the modification catalog (which may grow when
/// unseen dynamic masses are observed) and the per-tool conventions.
pub struct Processor {
    catalog: ModificationCatalog,
    options: SourceOptions,
    reconciler: MassReconciler,
    corrector: DeltaCorrector,
    abort: Option<Arc<AtomicBool>>,
}

impl Processor {
    pub fn new(catalog: ModificationCatalog, options: SourceOptions) -> Self {
        Self {
            catalog,
            options,
            reconciler: MassReconciler::default(),
            corrector: DeltaCorrector::default(),
            abort: None,
        }
    }

    /// Install a cooperative abort flag, polled once per input line.
    pub fn with_abort(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    pub fn catalog(&self) -> &ModificationCatalog {
        &self.catalog
    }

    pub fn process_file(
        &mut self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<ProcessingSummary, Error> {
        let reader = BufReader::new(File::open(input)?);
        let writer = BufWriter::new(File::create(output)?);
        self.process(reader, writer)
    }

    /// Run the full pipeline from a reader to a writer.
    pub fn process<R: io::Read, W: io::Write>(
        &mut self,
        input: R,
        output: W,
    ) -> Result<ProcessingSummary, Error> {
        let mut summary = ProcessingSummary::default();
        let mut matches = self.read_matches(input, &mut summary)?;
        if matches.is_empty() {
            return Err(Error::NoValidRows);
        }

        assign_ranks(&mut matches, self.options.score_direction);

        // better-first with deterministic tie-breaks; rows of one physical
        // PSM share all key fields and stay contiguous for duplicate grouping
        let direction = self.options.score_direction;
        matches.sort_by(|a, b| {
            direction
                .compare(a.score, b.score)
                .then_with(|| a.scan.cmp(&b.scan))
                .then_with(|| a.charge.cmp(&b.charge))
                .then_with(|| a.clean_sequence.cmp(&b.clean_sequence))
                .then_with(|| a.annotated_sequence.cmp(&b.annotated_sequence))
        });
        assign_fdr(&mut matches, &self.options.decoy, self.options.duplicate_key);

        summary.rows_written = write_synopsis(&matches, &self.options, output)?;
        summary.mass_mismatches = self.reconciler.mismatches();
        summary.implausible_deltas = self.corrector.implausible_count();
        summary.messages.log_all();
        Ok(summary)
    }

    fn read_matches<R: io::Read>(
        &mut self,
        input: R,
        summary: &mut ProcessingSummary,
    ) -> Result<Vec<NormalizedMatch>, Error> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut matches = Vec::new();
        let mut schema: Option<ColumnSchema> = None;

        for (line, record) in reader.records().enumerate() {
            if let Some(flag) = &self.abort {
                if flag.load(Ordering::Relaxed) {
                    return Err(Error::Aborted);
                }
            }
            let record = record?;
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }

            if schema.is_none() && ColumnSchema::looks_like_header(&record) {
                schema = Some(ColumnSchema::from_header(&record)?);
                continue;
            }
            let schema = schema.get_or_insert_with(ColumnSchema::default_order);

            summary.rows_read += 1;
            match schema
                .parse_row(&record)
                .and_then(|row| self.normalize(row, &mut summary.messages))
            {
                Ok(psm) => matches.push(psm),
                Err(err) => {
                    summary.rows_skipped += 1;
                    summary.messages.push_row_error(line + 1, &err);
                }
            }
        }
        Ok(matches)
    }

    /// Stages 1-4 for one row: tokenize, resolve, reconcile, correct.
    fn normalize(
        &mut self,
        row: ParsedRow,
        messages: &mut MessageCollector,
    ) -> Result<NormalizedMatch, RowError> {
        let (clean_sequence, tokens) = match self.options.mod_annotation {
            ModAnnotation::Inline => {
                let tokenized = modification::tokenize_inline(&row.peptide);
                for err in &tokenized.errors {
                    messages.push(format!("scan {}: {}", row.scan, err));
                }
                (tokenized.clean_sequence, tokenized.tokens)
            }
            ModAnnotation::SideChannel => {
                let clean = modification::clean_peptide(&row.peptide);
                let tokens = match &row.modification_list {
                    Some(list) => {
                        let (tokens, errors) = modification::tokenize_side_channel(list, clean.len());
                        for err in &errors {
                            messages.push(format!("scan {}: {}", row.scan, err));
                        }
                        tokens
                    }
                    None => Vec::new(),
                };
                (clean, tokens)
            }
        };

        // canonicalize observed dynamic masses, registering unseen ones
        for token in &tokens {
            if let TokenValue::Mass(mass) = token.value {
                let residue = clean_sequence
                    .as_bytes()
                    .get(token.position.saturating_sub(1))
                    .map(|&r| r as char);
                self.catalog
                    .resolve(mass, ModificationKind::Dynamic, residue);
            }
        }

        let (modifications, errors) = resolve_modifications(&tokens, &clean_sequence, &self.catalog);
        for err in &errors {
            messages.push(format!("scan {}: {}", row.scan, err));
        }

        let reconciled =
            self.reconciler
                .reconcile(&clean_sequence, &modifications, row.reported_mass)?;

        let observed = mass::neutral_mass(row.precursor_mz, row.charge);
        let delta = self.corrector.correct(observed, reconciled.theoretical);

        Ok(NormalizedMatch {
            scan: row.scan,
            charge: row.charge,
            precursor_mz: row.precursor_mz,
            annotated_sequence: row.peptide,
            clean_sequence,
            modifications,
            calc_mono_mass: reconciled.theoretical,
            observed_precursor_mass: observed,
            del_m: delta.corrected_da,
            del_m_ppm: delta.corrected_ppm,
            mh: reconciled.mh,
            score: row.score,
            rank: 0,
            proteins: row.proteins,
            fdr: 1.0,
            q_value: 1.0,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::modification::ModificationDef;
    use crate::rank::ScoreDirection;

    fn options() -> SourceOptions {
        SourceOptions {
            score_direction: ScoreDirection::HigherIsBetter,
            ..SourceOptions::default()
        }
    }

    fn catalog() -> ModificationCatalog {
        ModificationCatalog::new(vec![ModificationDef {
            name: "Carbamidomethyl".into(),
            mass: 57.02146,
            kind: ModificationKind::Static,
            residues: Some(vec!['C']),
            terminus: None,
        }])
    }

    #[test]
    fn malformed_rows_are_skipped_and_counted() {
        let input = "Scan\tCharge\tPrecursorMZ\tPeptide\tScore\tProtein\n\
                     100\t2\t400.0\tPEPTIDEK\t50.0\tP1\n\
                     101\tbad\t400.0\tPEPTIDEK\t49.0\tP1\n\
                     102\t2\t400.0\tPEPTIDEK\t48.0\tP1\n";
        let mut processor = Processor::new(catalog(), options());
        let mut out = Vec::new();
        let summary = processor.process(input.as_bytes(), &mut out).unwrap();
        assert_eq!(summary.rows_read, 3);
        assert_eq!(summary.rows_skipped, 1);
        assert_eq!(summary.rows_written, 2);
        assert!(!summary.messages.is_empty());
    }

    #[test]
    fn zero_valid_rows_is_fatal() {
        let input = "Scan\tCharge\tPrecursorMZ\tPeptide\tScore\n\
                     x\ty\tz\tPEPTIDE\tbad\n";
        let mut processor = Processor::new(catalog(), options());
        let err = processor.process(input.as_bytes(), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::NoValidRows));
    }

    #[test]
    fn missing_header_column_is_fatal() {
        let input = "Scan\tCharge\tPeptide\tScore\n";
        let mut processor = Processor::new(catalog(), options());
        let err = processor.process(input.as_bytes(), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn abort_flag_stops_processing() {
        let input = "Scan\tCharge\tPrecursorMZ\tPeptide\tScore\n\
                     100\t2\t400.0\tPEPTIDEK\t50.0\n";
        let flag = Arc::new(AtomicBool::new(true));
        let mut processor = Processor::new(catalog(), options()).with_abort(flag);
        let err = processor.process(input.as_bytes(), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Aborted));
    }

    #[test]
    fn headerless_input_uses_default_column_order() {
        // Scan, Charge, PrecursorMZ, Mass, Peptide, Modifications, Protein, Score
        let input = "100\t2\t400.0\t0\tPEPTIDEK\t\tP1\t50.0\n";
        let mut processor = Processor::new(catalog(), options());
        let mut out = Vec::new();
        let summary = processor.process(input.as_bytes(), &mut out).unwrap();
        assert_eq!(summary.rows_read, 1);
        assert_eq!(summary.rows_written, 1);
    }

    #[test]
    fn side_channel_flanked_peptide_processes() {
        // flanking-residue notation must not reach the mass calculation
        let input = "Scan\tCharge\tPrecursorMZ\tPeptide\tMods\tScore\tProtein\n\
                     10\t2\t400.0\tK.PEPTIDER.A\t\t30.0\tP1\n";
        let mut options = options();
        options.mod_annotation = ModAnnotation::SideChannel;
        let mut processor = Processor::new(catalog(), options);
        let mut out = Vec::new();
        let summary = processor.process(input.as_bytes(), &mut out).unwrap();
        assert_eq!(summary.rows_skipped, 0);
        assert_eq!(summary.rows_written, 1);
    }

    #[test]
    fn unseen_inline_mass_grows_the_catalog() {
        let input = "Scan\tCharge\tPrecursorMZ\tPeptide\tScore\n\
                     100\t2\t400.0\tPEPS+79.966TIDE\t50.0\n";
        let mut processor = Processor::new(catalog(), options());
        let before = processor.catalog().defs().len();
        processor.process(input.as_bytes(), &mut Vec::new()).unwrap();
        assert_eq!(processor.catalog().defs().len(), before + 1);
    }
}
