use nalgebra::{DMatrix, DVector, Dyn, LU, Vector2};
use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};
use num_complex::Complex64;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::basic::error::{LoadFlowError, Result};

/// Represents the ground node in a port.
pub const GND: i64 = -1;

/// Represents a port with a positive and a negative terminal.
///
/// Either terminal may be [`GND`]; stamps touching ground are dropped because ground is not a row
/// of the matrix.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Port2(pub Vector2<i64>);

impl Port2 {
    pub fn new(positive: i64, negative: i64) -> Self {
        Port2(Vector2::new(positive, negative))
    }

    /// A port between `node` and ground.
    pub fn grounded(node: usize) -> Self {
        Port2(Vector2::new(node as i64, GND))
    }

    pub fn positive(&self) -> i64 {
        self.0[0]
    }

    pub fn negative(&self) -> i64 {
        self.0[1]
    }
}

/// Nodal admittance matrix `Y` of one voltage level.
///
/// Stamps accumulate in coordinate form, duplicates are summed when the matrix is compressed.
/// Internal auxiliary nodes used by the controlled-source stamps are ordinary rows of the matrix
/// and must be part of the node list handed to the load-flow calculator.
#[derive(Debug, Clone)]
pub struct AdmittanceMatrix {
    values: CooMatrix<Complex64>,
}

/// LU factorization of an admittance matrix for repeated solves.
#[derive(Debug, Clone)]
pub struct Factorization {
    lu: LU<Complex64, Dyn, Dyn>,
    dimension: usize,
}

impl Factorization {
    /// Solves `Y x = b`.
    pub fn solve(&self, b: &DVector<Complex64>) -> Result<DVector<Complex64>> {
        if b.len() != self.dimension {
            return Err(LoadFlowError::DimensionMismatch {
                expected: self.dimension,
                actual: b.len(),
            });
        }
        self.lu
            .solve(b)
            .ok_or_else(|| LoadFlowError::singular("zero pivot in LU factorization"))
    }
}

impl AdmittanceMatrix {
    pub fn new(dimension: usize) -> Self {
        Self { values: CooMatrix::new(dimension, dimension) }
    }

    /// Builds a matrix from a dense one; every non-zero entry must be finite.
    pub fn from_dense(dense: &DMatrix<Complex64>) -> Result<Self> {
        if dense.nrows() != dense.ncols() {
            return Err(LoadFlowError::DimensionMismatch {
                expected: dense.nrows(),
                actual: dense.ncols(),
            });
        }
        let mut matrix = Self::new(dense.nrows());
        for ((row, column), value) in
            dense.iter().enumerate().map(|(k, v)| ((k % dense.nrows(), k / dense.nrows()), v))
        {
            if !value.is_zero() {
                matrix.add_unsymmetric_admittance(row, column, *value)?;
            }
        }
        Ok(matrix)
    }

    pub fn dimension(&self) -> usize {
        self.values.nrows()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.dimension() {
            return Err(LoadFlowError::IndexOutOfRange { index, dimension: self.dimension() });
        }
        Ok(())
    }

    fn check_terminal(&self, terminal: i64) -> Result<Option<usize>> {
        match terminal {
            GND => Ok(None),
            t if t < 0 => Err(LoadFlowError::NegativeDimension { index: t }),
            t => {
                self.check_index(t as usize)?;
                Ok(Some(t as usize))
            }
        }
    }

    fn check_port(&self, port: &Port2) -> Result<(Option<usize>, Option<usize>)> {
        Ok((self.check_terminal(port.positive())?, self.check_terminal(port.negative())?))
    }

    fn check_value(row: usize, column: usize, value: Complex64) -> Result<()> {
        if !value.is_finite() {
            return Err(LoadFlowError::InvalidAdmittance { row, column, value });
        }
        Ok(())
    }

    /// Stamps a symmetric branch with admittance `y` between `i` and `j`.
    pub fn add_connection(&mut self, i: usize, j: usize, y: Complex64) -> Result<()> {
        self.check_index(i)?;
        self.check_index(j)?;
        Self::check_value(i, j, y)?;
        self.values.push(i, i, y);
        self.values.push(j, j, y);
        self.values.push(i, j, -y);
        self.values.push(j, i, -y);
        Ok(())
    }

    /// Stamps a branch from `i` to ground.
    pub fn add_shunt(&mut self, i: usize, y: Complex64) -> Result<()> {
        self.check_index(i)?;
        Self::check_value(i, i, y)?;
        self.values.push(i, i, y);
        Ok(())
    }

    /// Adds `y` to `Y[i, j]` only.
    pub fn add_unsymmetric_admittance(&mut self, i: usize, j: usize, y: Complex64) -> Result<()> {
        self.check_index(i)?;
        self.check_index(j)?;
        Self::check_value(i, j, y)?;
        self.values.push(i, j, y);
        Ok(())
    }

    fn stamp(&mut self, row: Option<usize>, column: Option<usize>, y: Complex64) {
        if let (Some(row), Some(column)) = (row, column) {
            self.values.push(row, column, y);
        }
    }

    /// Stamps `I(output) = g * V(input)` as a conductance-like coupling: the controlled current
    /// flows into the element at the positive output terminal.
    fn stamp_transconductance(&mut self, input: &Port2, output: &Port2, g: Complex64) -> Result<()> {
        let (ip, ineg) = self.check_port(input)?;
        let (op, oneg) = self.check_port(output)?;
        Self::check_value(op.unwrap_or(0), ip.unwrap_or(0), g)?;
        self.stamp(op, ip, g);
        self.stamp(op, ineg, -g);
        self.stamp(oneg, ip, -g);
        self.stamp(oneg, ineg, g);
        Ok(())
    }

    fn stamp_gyrator(&mut self, input: &Port2, output: &Port2, g: Complex64) -> Result<()> {
        self.check_port(input)?;
        self.check_port(output)?;
        self.stamp_transconductance(output, input, g)?;
        self.stamp_transconductance(input, output, -g)
    }

    /// Stamps an ideal gyrator with gyration resistance `resistance`:
    /// `I(input) = V(output) / r`, `I(output) = -V(input) / r`.
    pub fn add_gyrator(&mut self, input: Port2, output: Port2, resistance: f64) -> Result<()> {
        self.stamp_gyrator(&input, &output, Complex64::new(1.0 / resistance, 0.0))
    }

    /// Stamps an ideal transformer `V(input) = ratio * V(output)` as two cascaded gyrators through
    /// `internal`. The internal node has no self admittance.
    pub fn add_ideal_transformer(
        &mut self,
        input: Port2,
        output: Port2,
        internal: usize,
        ratio: Complex64,
        resistance_weight: f64,
    ) -> Result<()> {
        self.check_index(internal)?;
        self.check_port(&input)?;
        self.check_port(&output)?;
        let middle = Port2::new(internal as i64, output.negative());
        let first = Complex64::new(1.0, 0.0) / (ratio * resistance_weight);
        let second = Complex64::new(1.0 / resistance_weight, 0.0);
        self.stamp_gyrator(&input, &middle, first)?;
        self.stamp_gyrator(&middle, &output, second)
    }

    /// Stamps a voltage controlled current source `I(output) = transconductance * V(input)`.
    pub fn add_voltage_controlled_current_source(
        &mut self,
        input: Port2,
        output: Port2,
        transconductance: Complex64,
    ) -> Result<()> {
        self.stamp_transconductance(&input, &output, transconductance)
    }

    /// Stamps a current controlled current source `I(output) = amplification * I(input)`.
    ///
    /// The input is short circuited by a gyrator into `internal`, whose voltage then drives a
    /// transconductance.
    pub fn add_current_controlled_current_source(
        &mut self,
        input: Port2,
        output: Port2,
        internal: usize,
        amplification: Complex64,
        resistance_weight: f64,
    ) -> Result<()> {
        self.check_index(internal)?;
        self.check_port(&input)?;
        self.check_port(&output)?;
        let middle = Port2::new(internal as i64, input.negative());
        self.add_gyrator(input, middle, resistance_weight)?;
        self.stamp_transconductance(&middle, &output, amplification / resistance_weight)
    }

    /// Stamps a voltage controlled voltage source `V(output) = amplification * V(input)`.
    pub fn add_voltage_controlled_voltage_source(
        &mut self,
        input: Port2,
        output: Port2,
        internal: usize,
        amplification: Complex64,
        resistance_weight: f64,
    ) -> Result<()> {
        self.check_index(internal)?;
        self.check_port(&input)?;
        self.check_port(&output)?;
        let middle = Port2::new(internal as i64, output.negative());
        self.stamp_transconductance(&input, &middle, -amplification / resistance_weight)?;
        self.add_gyrator(middle, output, resistance_weight)
    }

    /// Stamps a current controlled voltage source `V(output) = transresistance * I(input)`
    /// through two internal nodes.
    pub fn add_current_controlled_voltage_source(
        &mut self,
        input: Port2,
        output: Port2,
        first_internal: usize,
        second_internal: usize,
        transresistance: Complex64,
        resistance_weight: f64,
    ) -> Result<()> {
        self.check_index(first_internal)?;
        self.check_index(second_internal)?;
        self.check_port(&input)?;
        self.check_port(&output)?;
        let middle = Port2::new(first_internal as i64, input.negative());
        self.add_gyrator(input, middle, resistance_weight)?;
        self.add_voltage_controlled_voltage_source(
            middle,
            output,
            second_internal,
            transresistance / resistance_weight,
            resistance_weight,
        )
    }

    /// Returns `Y[i, j]`.
    pub fn get(&self, i: usize, j: usize) -> Complex64 {
        self.values
            .triplet_iter()
            .filter(|(r, c, _)| *r == i && *c == j)
            .fold(Complex64::zero(), |acc, (_, _, v)| acc + v)
    }

    pub fn to_csc(&self) -> CscMatrix<Complex64> {
        CscMatrix::from(&self.values)
    }

    pub fn to_csr(&self) -> CsrMatrix<Complex64> {
        CsrMatrix::from(&self.values)
    }

    pub fn to_dense(&self) -> DMatrix<Complex64> {
        DMatrix::from(&self.values)
    }

    /// Sum of every row, i.e. the admittance from each node to ground.
    pub fn row_sums(&self) -> DVector<Complex64> {
        let mut sums = DVector::zeros(self.dimension());
        self.values.triplet_iter().for_each(|(r, _, v)| sums[r] += v);
        sums
    }

    fn check_voltages(&self, voltages: &DVector<Complex64>) -> Result<()> {
        if voltages.len() != self.dimension() {
            return Err(LoadFlowError::DimensionMismatch {
                expected: self.dimension(),
                actual: voltages.len(),
            });
        }
        Ok(())
    }

    /// `I = Y v`.
    pub fn calculate_currents(&self, voltages: &DVector<Complex64>) -> Result<DVector<Complex64>> {
        self.check_voltages(voltages)?;
        Ok(&self.to_csc() * voltages)
    }

    /// Injected power of every node, `v ⊙ conj(Y v)`.
    pub fn calculate_all_powers(&self, voltages: &DVector<Complex64>) -> Result<DVector<Complex64>> {
        let currents = self.calculate_currents(voltages)?;
        Ok(voltages.component_mul(&currents.conjugate()))
    }

    /// Power absorbed by the admittances.
    ///
    /// Every off-diagonal entry contributes `-v_i conj(Y_ij (v_i - v_j))` and every node its ground
    /// branch `|v_i|^2 conj(rowsum_i)`. For a symmetric network without ground branches this is
    /// `-Σ_{i<j} (v_i - v_j) conj(Y_ij (v_i - v_j))`.
    pub fn calculate_power_loss(&self, voltages: &DVector<Complex64>) -> Result<Complex64> {
        self.check_voltages(voltages)?;
        let csr = self.to_csr();
        let ground = self
            .row_sums()
            .iter()
            .zip(voltages.iter())
            .fold(Complex64::zero(), |acc, (y, v)| acc + v * (y * v).conj());
        let branches = csr
            .triplet_iter()
            .filter(|(i, j, _)| i != j)
            .fold(Complex64::zero(), |acc, (i, j, y)| {
                let difference = voltages[i] - voltages[j];
                acc - voltages[i] * (y * difference).conj()
            });
        Ok(ground + branches)
    }

    /// Extracts the sub-matrix over `unknown` rows and columns and folds the `known` columns into
    /// the constant current `-Y_uk v_known`.
    pub fn create_reduced_admittance_matrix(
        &self,
        unknown: &[usize],
        known: &[usize],
        known_voltages: &DVector<Complex64>,
    ) -> Result<(AdmittanceMatrix, DVector<Complex64>)> {
        if known.len() != known_voltages.len() {
            return Err(LoadFlowError::DimensionMismatch {
                expected: known.len(),
                actual: known_voltages.len(),
            });
        }
        let n = self.dimension();
        let mut unknown_pos = vec![None; n];
        let mut known_pos = vec![None; n];
        for (k, &i) in unknown.iter().enumerate() {
            self.check_index(i)?;
            unknown_pos[i] = Some(k);
        }
        for (k, &i) in known.iter().enumerate() {
            self.check_index(i)?;
            known_pos[i] = Some(k);
        }

        let mut reduced = CooMatrix::new(unknown.len(), unknown.len());
        let mut constant_currents = DVector::zeros(unknown.len());
        for (r, c, y) in self.values.triplet_iter() {
            let Some(row) = unknown_pos[r] else { continue };
            if let Some(column) = unknown_pos[c] {
                reduced.push(row, column, *y);
            } else if let Some(column) = known_pos[c] {
                constant_currents[row] -= y * known_voltages[column];
            }
        }
        Ok((AdmittanceMatrix { values: reduced }, constant_currents))
    }

    /// LU factorization of the matrix.
    pub fn calculate_factorization(&self) -> Result<Factorization> {
        let lu = self.to_dense().lu();
        if !lu.is_invertible() {
            return Err(LoadFlowError::singular("admittance matrix is not invertible"));
        }
        Ok(Factorization { lu, dimension: self.dimension() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn test_symmetric_network_rows_sum_to_zero() {
        let mut y = AdmittanceMatrix::new(4);
        y.add_connection(0, 1, c(1.0, -3.0)).unwrap();
        y.add_connection(1, 2, c(2.0, -5.0)).unwrap();
        y.add_connection(2, 3, c(0.5, 0.2)).unwrap();
        y.add_connection(3, 0, c(4.0, -1.0)).unwrap();
        y.add_connection(1, 3, c(3.0, 1.0)).unwrap();
        for sum in y.row_sums().iter() {
            assert!(sum.norm() < 1e-12, "row sum {} is not zero", sum);
        }
        assert_eq!(y.get(1, 1), c(6.0, -7.0));
        assert_eq!(y.get(1, 2), c(-2.0, 5.0));
    }

    #[test]
    fn test_invalid_input_is_rejected_at_insertion() {
        let mut y = AdmittanceMatrix::new(2);
        assert!(matches!(
            y.add_connection(0, 1, c(f64::NAN, 0.0)),
            Err(LoadFlowError::InvalidAdmittance { .. })
        ));
        assert!(matches!(
            y.add_connection(0, 1, c(0.0, f64::INFINITY)),
            Err(LoadFlowError::InvalidAdmittance { .. })
        ));
        assert!(matches!(
            y.add_connection(0, 2, c(1.0, 0.0)),
            Err(LoadFlowError::IndexOutOfRange { index: 2, dimension: 2 })
        ));
        assert!(matches!(
            y.add_gyrator(Port2::new(-3, GND), Port2::grounded(1), 1.0),
            Err(LoadFlowError::NegativeDimension { index: -3 })
        ));
        assert!(y.to_csc().nnz() == 0);
    }

    #[test]
    fn test_powers_and_loss_balance() {
        let mut y = AdmittanceMatrix::new(3);
        y.add_connection(0, 1, c(10.0, -20.0)).unwrap();
        y.add_connection(1, 2, c(5.0, -15.0)).unwrap();
        y.add_shunt(2, c(0.1, 0.3)).unwrap();
        let v = DVector::from_vec(vec![c(1.0, 0.0), c(0.97, -0.02), c(0.95, -0.05)]);
        let powers = y.calculate_all_powers(&v).unwrap();
        let loss = y.calculate_power_loss(&v).unwrap();
        assert!((powers.sum() - loss).norm() < 1e-12);

        // branch form of a single symmetric branch
        let mut line = AdmittanceMatrix::new(2);
        line.add_connection(0, 1, c(2.0, -4.0)).unwrap();
        let v = DVector::from_vec(vec![c(1.0, 0.0), c(0.9, 0.1)]);
        let y01 = line.get(0, 1);
        let d = v[0] - v[1];
        let expected = -(d * (y01 * d).conj());
        assert!((line.calculate_power_loss(&v).unwrap() - expected).norm() < 1e-12);
    }

    #[test]
    fn test_reduced_matrix() {
        let mut y = AdmittanceMatrix::new(3);
        y.add_connection(0, 1, c(1.0, -2.0)).unwrap();
        y.add_connection(1, 2, c(3.0, -1.0)).unwrap();
        let known = DVector::from_vec(vec![c(1.0, 0.0)]);
        let (reduced, currents) = y.create_reduced_admittance_matrix(&[2, 1], &[0], &known).unwrap();
        assert_eq!(reduced.dimension(), 2);
        assert_eq!(reduced.get(0, 0), c(3.0, -1.0));
        assert_eq!(reduced.get(1, 1), c(4.0, -3.0));
        assert_eq!(reduced.get(0, 1), c(-3.0, 1.0));
        assert_eq!(currents[0], c(0.0, 0.0));
        assert_eq!(currents[1], c(1.0, -2.0));

        // solving the reduced system reproduces the full one
        let v = DVector::from_vec(vec![c(1.0, 0.0), c(0.98, -0.01), c(0.95, -0.03)]);
        let injected = y.calculate_currents(&v).unwrap();
        let unknown_v = DVector::from_vec(vec![v[2], v[1]]);
        let rhs = DVector::from_vec(vec![injected[2], injected[1]]) + &currents;
        let solved = reduced.calculate_factorization().unwrap().solve(&rhs).unwrap();
        assert!((solved - unknown_v).norm() < 1e-12);
    }

    #[test]
    fn test_ideal_transformer_is_lossless() {
        let mut y = AdmittanceMatrix::new(3);
        y.add_ideal_transformer(Port2::grounded(0), Port2::grounded(2), 1, c(2.0, 0.0), 1.0)
            .unwrap();
        assert_eq!(y.get(1, 1), c(0.0, 0.0));
        // V2 = V0 / 2 with zero current at the internal node
        let v = DVector::from_vec(vec![c(1.0, 0.0), c(0.3, 0.1), c(0.5, 0.0)]);
        let currents = y.calculate_currents(&v).unwrap();
        assert!(currents[1].norm() < 1e-12);
        let powers = y.calculate_all_powers(&v).unwrap();
        assert!((powers[0] + powers[2]).norm() < 1e-12);
    }

    #[test]
    fn test_controlled_sources() {
        // VCVS: V(2) = 3 V(0) once the internal node carries no current.
        let mut y = AdmittanceMatrix::new(3);
        y.add_voltage_controlled_voltage_source(
            Port2::grounded(0),
            Port2::grounded(2),
            1,
            c(3.0, 0.0),
            2.0,
        )
        .unwrap();
        let v = DVector::from_vec(vec![c(0.5, 0.0), c(0.7, 0.2), c(1.5, 0.0)]);
        let currents = y.calculate_currents(&v).unwrap();
        assert!(currents[0].norm() < 1e-12);
        assert!(currents[1].norm() < 1e-12);

        // CCCS: I(out) = 4 I(in) with the input shorted.
        let mut y = AdmittanceMatrix::new(3);
        y.add_current_controlled_current_source(
            Port2::grounded(0),
            Port2::grounded(2),
            1,
            c(4.0, 0.0),
            1.0,
        )
        .unwrap();
        let v = DVector::from_vec(vec![c(0.0, 0.0), c(0.25, 0.0), c(0.8, 0.0)]);
        let currents = y.calculate_currents(&v).unwrap();
        assert!(currents[1].norm() < 1e-12);
        assert!((currents[2] - 4.0 * currents[0]).norm() < 1e-12);
    }
}
