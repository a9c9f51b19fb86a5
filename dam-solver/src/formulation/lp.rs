use super::{Cmp, Domain, Formulation, Sense, VarId};
use std::io::Write;

// Long rows are wrapped, as some readers limit the line length.
const TERMS_PER_LINE: usize = 8;

impl Formulation {
    /// Export the formulation in CPLEX `.lp` format.
    ///
    /// Fixed variables are written with their fixed value as both bounds, so
    /// the file reproduces the formulation exactly as the next solve would see it.
    pub fn write_lp(&self, buffer: &mut impl Write) -> Result<(), std::io::Error> {
        // https://www.ibm.com/docs/en/icos/22.1.2?topic=cplex-lp-file-format-algebraic-representation
        writeln!(buffer, "\\ {}", self.name)?;
        match self.sense {
            Sense::Maximise => writeln!(buffer, "Maximize")?,
            Sense::Minimise => writeln!(buffer, "Minimize")?,
        }
        write!(buffer, " obj:")?;
        self.write_terms(buffer, &self.objective.merged())?;
        writeln!(buffer)?;
        if self.objective.constant() != 0.0 {
            writeln!(buffer, "\\ objective constant {}", self.objective.constant())?;
        }

        writeln!(buffer, "Subject To")?;
        for row in self.rows.iter() {
            write!(buffer, " {}:", row.name)?;
            self.write_terms(buffer, &row.terms)?;
            let cmp = match row.cmp {
                Cmp::Le => "<=",
                Cmp::Ge => ">=",
                Cmp::Eq => "=",
            };
            writeln!(buffer, " {cmp} {}", row.rhs)?;
        }

        writeln!(buffer, "Bounds")?;
        for variable in self.variables.iter() {
            let name = variable.name();
            match variable.bounds() {
                (lower, upper) if lower == upper => writeln!(buffer, " {name} = {lower}")?,
                (lower, upper) if lower.is_infinite() && upper.is_infinite() => {
                    writeln!(buffer, " {name} free")?
                }
                (lower, upper) if upper.is_infinite() => writeln!(buffer, " {name} >= {lower}")?,
                (lower, upper) if lower.is_infinite() => {
                    writeln!(buffer, " -inf <= {name} <= {upper}")?
                }
                (lower, upper) => writeln!(buffer, " {lower} <= {name} <= {upper}")?,
            }
        }

        for (section, domain) in [("Binaries", Domain::Binary), ("Generals", Domain::Integer)] {
            let names: Vec<&str> = self
                .variables
                .iter()
                .filter(|v| v.domain() == domain)
                .map(|v| v.name())
                .collect();
            if names.is_empty() {
                continue;
            }
            writeln!(buffer, "{section}")?;
            for chunk in names.chunks(TERMS_PER_LINE) {
                writeln!(buffer, " {}", chunk.join(" "))?;
            }
        }

        writeln!(buffer, "End")?;
        Ok(())
    }

    fn write_terms(&self, buffer: &mut impl Write, terms: &[(VarId, f64)]) -> Result<(), std::io::Error> {
        if terms.is_empty() {
            // An empty row still needs a variable for most readers
            if let Some(first) = self.variables.first() {
                write!(buffer, " 0 {}", first.name())?;
            }
            return Ok(());
        }
        for (position, (var, coefficient)) in terms.iter().enumerate() {
            if position > 0 && position % TERMS_PER_LINE == 0 {
                write!(buffer, "\n   ")?;
            }
            let sign = if *coefficient < 0.0 { '-' } else { '+' };
            write!(
                buffer,
                " {sign} {} {}",
                coefficient.abs(),
                self.variables[var.index()].name()
            )?;
        }
        Ok(())
    }
}
