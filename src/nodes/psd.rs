//! PsdNode: power spectrum of an array.
//!
//! Two methods:
//! - `fft`: magnitude and phase of the full FFT of each row.
//! - `welch`: averaged periodogram over Hann-windowed segments of
//!   `sfreq / precision` samples, phase output is zeros.
//!
//! Bins outside `[f_min, f_max]` are dropped. The retained frequency axis is
//! written to `meta.channels.dim0` (1-D input) or `dim1` (2-D input).

use crate::node::{Node, NodeContext, NodeError, Outputs, Param, ParamTree, SlotDescriptor};
use crate::protocol::{Array, Data, DataType};
use rustfft::{num_complex::Complex, FftPlanner};
use serde_json::{Map, Value};
use std::f64::consts::PI;

static INPUTS: &[SlotDescriptor] = &[SlotDescriptor::new("data", DataType::Array)];
static OUTPUTS: &[SlotDescriptor] = &[
    SlotDescriptor::new("psd", DataType::Array),
    SlotDescriptor::new("phase", DataType::Array),
];

const GROUP: &str = "psd";

pub struct PsdNode {
    planner: FftPlanner<f64>,
}

impl Default for PsdNode {
    fn default() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }
}

/// Frequencies of an `n`-point FFT, numpy `fftfreq` ordering.
fn fft_frequencies(n: usize, sfreq: f64) -> Vec<f64> {
    let span = n as f64 / sfreq;
    (0..n)
        .map(|k| {
            if k < n.div_ceil(2) {
                k as f64 / span
            } else {
                (k as f64 - n as f64) / span
            }
        })
        .collect()
}

fn hann(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / n as f64).cos()))
        .collect()
}

struct Spectrum {
    freqs: Vec<f64>,
    power: Vec<f64>,
    phase: Vec<f64>,
}

impl PsdNode {
    fn fft_row(&mut self, row: &[f64], sfreq: f64) -> Spectrum {
        let n = row.len();
        let mut buffer: Vec<Complex<f64>> = row.iter().map(|&v| Complex::new(v, 0.0)).collect();
        self.planner.plan_fft_forward(n).process(&mut buffer);
        Spectrum {
            freqs: fft_frequencies(n, sfreq),
            power: buffer.iter().map(|c| c.norm()).collect(),
            phase: buffer.iter().map(|c| c.arg()).collect(),
        }
    }

    fn welch_row(&mut self, row: &[f64], sfreq: f64, nperseg: usize, noverlap: usize) -> Spectrum {
        let nperseg = nperseg.clamp(1, row.len());
        let noverlap = noverlap.min(nperseg - 1);
        let step = nperseg - noverlap;
        let window = hann(nperseg);
        let scale = sfreq * window.iter().map(|w| w * w).sum::<f64>();
        let bins = nperseg / 2 + 1;
        let fft = self.planner.plan_fft_forward(nperseg);

        let mut power = vec![0.0; bins];
        let mut segments = 0usize;
        let mut start = 0;
        while start + nperseg <= row.len() {
            let segment = &row[start..start + nperseg];
            let mean = segment.iter().sum::<f64>() / nperseg as f64;
            let mut buffer: Vec<Complex<f64>> = segment
                .iter()
                .zip(&window)
                .map(|(&v, &w)| Complex::new((v - mean) * w, 0.0))
                .collect();
            fft.process(&mut buffer);
            for (k, p) in power.iter_mut().enumerate() {
                let mut density = buffer[k].norm_sqr() / scale;
                // One-sided: fold the negative frequencies in, except DC and Nyquist.
                if k != 0 && !(nperseg % 2 == 0 && k == bins - 1) {
                    density *= 2.0;
                }
                *p += density;
            }
            segments += 1;
            start += step;
        }
        if segments > 0 {
            power.iter_mut().for_each(|p| *p /= segments as f64);
        }

        Spectrum {
            freqs: (0..bins).map(|k| k as f64 * sfreq / nperseg as f64).collect(),
            phase: vec![0.0; bins],
            power,
        }
    }
}

impl Node for PsdNode {
    fn input_slots(&self) -> &[SlotDescriptor] {
        INPUTS
    }

    fn output_slots(&self) -> &[SlotDescriptor] {
        OUTPUTS
    }

    fn params(&self) -> ParamTree {
        ParamTree::new().group(
            GROUP,
            [
                ("method", Param::choice("welch", &["fft", "welch"])),
                ("noverlap", Param::int(0, Some(0), Some(10_000))),
                (
                    "precision",
                    Param::float(0.1, Some(0.01), Some(10.0)).doc("Welch frequency resolution in Hz"),
                ),
                ("f_min", Param::float(1.0, Some(0.01), Some(9999.0))),
                ("f_max", Param::float(60.0, Some(1.0), Some(10_000.0))),
            ],
        )
    }

    fn process(&mut self, ctx: &mut NodeContext) -> Result<Option<Outputs>, NodeError> {
        let Some(data) = ctx.inputs.get("data") else {
            return Ok(None);
        };
        let array = data
            .as_array()
            .ok_or_else(|| NodeError::invalid_input("data", "expected an array"))?;
        if array.is_empty() {
            return Ok(None);
        }
        let sfreq = data
            .sfreq()
            .filter(|f| *f > 0.0)
            .ok_or_else(|| NodeError::invalid_input("data", "metadata has no positive sfreq"))?;

        let params = &*ctx.params;
        let method = params.string(GROUP, "method").unwrap_or("welch").to_string();
        let noverlap = params.int(GROUP, "noverlap").unwrap_or(0).max(0) as usize;
        let precision = params.float(GROUP, "precision").unwrap_or(0.1);
        let f_min = params.float(GROUP, "f_min").unwrap_or(1.0);
        let f_max = params.float(GROUP, "f_max").unwrap_or(60.0);
        let nperseg = (sfreq / precision) as usize;

        let mut freqs = Vec::new();
        let mut power = Vec::new();
        let mut phase = Vec::new();
        let mut width = 0;
        for row in array.rows() {
            let spectrum = match method.as_str() {
                "fft" => self.fft_row(row, sfreq),
                _ => self.welch_row(row, sfreq, nperseg, noverlap),
            };
            let keep: Vec<usize> = (0..spectrum.freqs.len())
                .filter(|&k| spectrum.freqs[k] >= f_min && spectrum.freqs[k] <= f_max)
                .collect();
            freqs = keep.iter().map(|&k| spectrum.freqs[k]).collect();
            width = keep.len();
            power.extend(keep.iter().map(|&k| spectrum.power[k]));
            phase.extend(keep.iter().map(|&k| spectrum.phase[k]));
        }

        let (shape, axis) = match array.ndim() {
            1 => (vec![width], "dim0"),
            _ => (vec![array.shape()[0], width], "dim1"),
        };
        let mut meta = data.meta.clone();
        let channels = meta
            .entry("channels")
            .or_insert_with(|| Value::Object(Map::new()));
        if !channels.is_object() {
            *channels = Value::Object(Map::new());
        }
        if let Value::Object(channels) = channels {
            channels.insert(axis.to_string(), Value::from(freqs));
        }

        let wrap = |values| {
            Array::with_shape(shape.clone(), values)
                .map(|a| Data::new(a.into(), meta.clone()))
                .map_err(|e| NodeError::processing(e.to_string()))
        };
        Ok(Some(Outputs::from([
            ("psd".to_string(), wrap(power)?),
            ("phase".to_string(), wrap(phase)?),
        ])))
    }
}
