// src/drivers/edf.rs
//! EDF (16-bit) and BDF (24-bit) recording reader.
//!
//! Layout: a 256-byte fixed header, then 256 bytes of per-signal header per
//! signal, then data records. Each record holds `samples_per_record[i]`
//! little-endian samples for signal 0, then signal 1, and so on.
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use byteorder::{ByteOrder, LittleEndian};
use crate::drivers::{ChannelConfig, Sample, SampleSource, StreamError};
const FIXED_HEADER_LEN: usize = 256;
const SIGNAL_HEADER_LEN: usize = 256;
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdfVariant {
    Edf,
    Bdf,
}
impl EdfVariant {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            EdfVariant::Edf => 2,
            EdfVariant::Bdf => 3,
        }
    }
}
#[derive(Clone, Debug)]
pub struct SignalHeader {
    pub label: String,
    pub physical_dimension: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: f64,
    pub digital_max: f64,
    pub samples_per_record: usize,
}
impl SignalHeader {
    pub fn is_annotation(&self) -> bool {
        matches!(self.label.as_str(), "EDF Annotations" | "BDF Annotations")
    }
    fn gain_offset(&self) -> (f64, f64) {
        let digital_span = self.digital_max - self.digital_min;
        let gain = if digital_span == 0.0 {
            1.0
        } else {
            (self.physical_max - self.physical_min) / digital_span
        };
        (gain, self.physical_min - self.digital_min * gain)
    }
}
#[derive(Clone, Debug)]
pub struct EdfHeader {
    pub variant: EdfVariant,
    pub patient: String,
    pub recording: String,
    pub header_bytes: u64,
    /// `None` when the writer left the count at -1.
    pub num_records: Option<u64>,
    pub record_duration_secs: f64,
    pub signals: Vec<SignalHeader>,
}
impl EdfHeader {
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self, StreamError> {
        let mut fixed = [0u8; FIXED_HEADER_LEN];
        reader
            .read_exact(&mut fixed)
            .map_err(|_| StreamError::format("file is shorter than the EDF header"))?;
        let variant = if fixed[0] == 0xFF && &fixed[1..8] == b"BIOSEMI" {
            EdfVariant::Bdf
        } else if ascii(&fixed[0..8]) == "0" {
            EdfVariant::Edf
        } else {
            return Err(StreamError::format("not an EDF or BDF file"));
        };
        let header_bytes: u64 = number(&fixed[184..192], "header length")?;
        let num_records: i64 = number(&fixed[236..244], "record count")?;
        let record_duration_secs: f64 = number(&fixed[244..252], "record duration")?;
        let signal_count: usize = number(&fixed[252..256], "signal count")?;
        if signal_count == 0 {
            return Err(StreamError::format("recording declares no signals"));
        }
        if record_duration_secs <= 0.0 {
            return Err(StreamError::format(format!(
                "record duration must be positive, got {record_duration_secs}"
            )));
        }
        let expected_len = (FIXED_HEADER_LEN + signal_count * SIGNAL_HEADER_LEN) as u64;
        if header_bytes != expected_len {
            return Err(StreamError::format(format!(
                "header length {header_bytes} does not match {signal_count} signals"
            )));
        }
        let mut raw = vec![0u8; signal_count * SIGNAL_HEADER_LEN];
        reader
            .read_exact(&mut raw)
            .map_err(|_| StreamError::format("truncated signal header"))?;
        // Signal header fields are stored column-wise: all labels, then all
        // transducers, and so on.
        let mut offset = 0;
        let mut column = |width: usize| {
            let fields: Vec<&[u8]> = (0..signal_count)
                .map(|i| &raw[offset + i * width..offset + (i + 1) * width])
                .collect();
            offset += width * signal_count;
            fields
        };
        let labels = column(16);
        let _transducers = column(80);
        let dimensions = column(8);
        let physical_mins = column(8);
        let physical_maxs = column(8);
        let digital_mins = column(8);
        let digital_maxs = column(8);
        let _prefilters = column(80);
        let samples_per_record = column(8);
        let signals = (0..signal_count)
            .map(|i| {
                Ok(SignalHeader {
                    label: ascii(labels[i]),
                    physical_dimension: ascii(dimensions[i]),
                    physical_min: number(physical_mins[i], "physical minimum")?,
                    physical_max: number(physical_maxs[i], "physical maximum")?,
                    digital_min: number(digital_mins[i], "digital minimum")?,
                    digital_max: number(digital_maxs[i], "digital maximum")?,
                    samples_per_record: number(samples_per_record[i], "samples per record")?,
                })
            })
            .collect::<Result<Vec<_>, StreamError>>()?;
        Ok(Self {
            variant,
            patient: ascii(&fixed[8..88]),
            recording: ascii(&fixed[88..168]),
            header_bytes,
            num_records: u64::try_from(num_records).ok(),
            record_duration_secs,
            signals,
        })
    }
    /// Size of one data record, or a format error when the declared sizes overflow.
    pub fn record_bytes(&self) -> Result<usize, StreamError> {
        self.signals
            .iter()
            .try_fold(0usize, |total, s| total.checked_add(s.samples_per_record))
            .and_then(|samples| samples.checked_mul(self.variant.bytes_per_sample()))
            .ok_or_else(|| StreamError::format("data record size overflows"))
    }
}
fn ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}
fn number<T: std::str::FromStr>(bytes: &[u8], what: &str) -> Result<T, StreamError> {
    let text = ascii(bytes);
    text.parse()
        .map_err(|_| StreamError::format(format!("invalid {what} '{text}'")))
}
/// Lazily decodes one data record at a time.
pub struct EdfSource {
    path: PathBuf,
    reader: BufReader<File>,
    header: EdfHeader,
    config: ChannelConfig,
    /// Indices into `header.signals` of the data channels.
    channels: Vec<usize>,
    scaling: Vec<(f64, f64)>,
    samples_per_record: usize,
    record_buf: Vec<u8>,
    /// Decoded current record, channel-major.
    decoded: Vec<Vec<f32>>,
    position: usize,
    records_read: u64,
    index: u64,
}
impl EdfSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StreamError> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);
        let file_len = reader.get_ref().metadata()?.len();
        let header = EdfHeader::parse(&mut reader)?;
        let record_bytes = header.record_bytes()?;
        let data_len = file_len.saturating_sub(header.header_bytes);
        let record_bytes = if header.num_records == Some(0) {
            0
        } else if record_bytes as u64 > data_len {
            return Err(StreamError::format(format!(
                "data record of {record_bytes} bytes exceeds the {data_len} bytes after the header"
            )));
        } else {
            record_bytes
        };
        let channels: Vec<usize> = header
            .signals
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_annotation())
            .map(|(i, _)| i)
            .collect();
        let Some(&first) = channels.first() else {
            return Err(StreamError::format("recording holds only annotations"));
        };
        let samples_per_record = header.signals[first].samples_per_record;
        if samples_per_record == 0 {
            return Err(StreamError::format("signals hold no samples per record"));
        }
        if let Some(&odd) = channels
            .iter()
            .find(|&&i| header.signals[i].samples_per_record != samples_per_record)
        {
            return Err(StreamError::format(format!(
                "mixed sample rates are not supported ('{}' has {} samples per record, expected {})",
                header.signals[odd].label, header.signals[odd].samples_per_record, samples_per_record
            )));
        }
        let sample_rate_hz = (samples_per_record as f64 / header.record_duration_secs) as f32;
        let labels = channels
            .iter()
            .map(|&i| header.signals[i].label.clone())
            .collect();
        let unit = match header.signals[first].physical_dimension.as_str() {
            "" => "uV".to_string(),
            other => other.to_string(),
        };
        let config = ChannelConfig::new(labels, sample_rate_hz)?.with_scale(1.0, unit)?;
        let scaling = channels
            .iter()
            .map(|&i| header.signals[i].gain_offset())
            .collect();
        log::info!(
            "{}: {:?}, {} channels @ {} Hz, {} records",
            path.display(),
            header.variant,
            config.channel_count(),
            sample_rate_hz,
            header
                .num_records
                .map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );
        Ok(Self {
            path,
            reader,
            record_buf: vec![0u8; record_bytes],
            decoded: vec![Vec::with_capacity(samples_per_record); channels.len()],
            header,
            config,
            channels,
            scaling,
            samples_per_record,
            position: samples_per_record,
            records_read: 0,
            index: 0,
        })
    }
    pub fn header(&self) -> &EdfHeader {
        &self.header
    }
    /// Reads the next data record. `false` at the end of the recording.
    fn load_record(&mut self) -> Result<bool, StreamError> {
        if self
            .header
            .num_records
            .is_some_and(|n| self.records_read >= n)
        {
            return Ok(false);
        }
        let mut filled = 0;
        while filled < self.record_buf.len() {
            match self.reader.read(&mut self.record_buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        if filled == 0 && self.header.num_records.is_none() {
            return Ok(false);
        }
        if filled < self.record_buf.len() {
            return Err(StreamError::format(format!(
                "data record {} is truncated ({filled} of {} bytes)",
                self.records_read,
                self.record_buf.len()
            )));
        }
        let width = self.header.variant.bytes_per_sample();
        let mut signal_offsets = Vec::with_capacity(self.header.signals.len());
        let mut offset = 0;
        for signal in &self.header.signals {
            signal_offsets.push(offset);
            offset += signal.samples_per_record * width;
        }
        for (slot, &signal) in self.channels.iter().enumerate() {
            let (gain, bias) = self.scaling[slot];
            let start = signal_offsets[signal];
            let decoded = &mut self.decoded[slot];
            decoded.clear();
            for chunk in self.record_buf[start..start + self.samples_per_record * width].chunks_exact(width) {
                let digital = match self.header.variant {
                    EdfVariant::Edf => LittleEndian::read_i16(chunk) as f64,
                    EdfVariant::Bdf => LittleEndian::read_i24(chunk) as f64,
                };
                decoded.push((digital * gain + bias) as f32);
            }
        }
        self.records_read += 1;
        self.position = 0;
        Ok(true)
    }
}
impl SampleSource for EdfSource {
    fn channel_config(&self) -> &ChannelConfig {
        &self.config
    }
    fn next_sample(&mut self) -> Result<Option<Sample>, StreamError> {
        if self.position >= self.samples_per_record && !self.load_record()? {
            return Ok(None);
        }
        let values: Vec<f32> = self.decoded.iter().map(|c| c[self.position]).collect();
        let timestamp = self.index as f64 * self.config.sample_period();
        self.position += 1;
        self.index += 1;
        Ok(Some(Sample::new(timestamp, values)))
    }
    fn is_restartable(&self) -> bool {
        true
    }
    fn restart(&mut self) -> Result<(), StreamError> {
        self.reader.seek(SeekFrom::Start(self.header.header_bytes))?;
        self.position = self.samples_per_record;
        self.records_read = 0;
        self.index = 0;
        Ok(())
    }
    fn describe(&self) -> String {
        format!("{:?} file {}", self.header.variant, self.path.display())
    }
}
/// Writes a minimal EDF/BDF file. Used to produce replay fixtures.
pub fn write_recording(
    path: impl AsRef<Path>,
    variant: EdfVariant,
    labels: &[&str],
    samples_per_record: usize,
    record_duration_secs: f64,
    digital: &[Vec<i32>],
) -> Result<(), StreamError> {
    use std::io::Write;
    let signal_count = labels.len();
    let total = digital.first().map_or(0, Vec::len);
    if digital.len() != signal_count || digital.iter().any(|c| c.len() != total) {
        return Err(StreamError::config("one equally long sample column per label is required"));
    }
    if samples_per_record == 0 || total % samples_per_record != 0 {
        return Err(StreamError::config("samples must fill whole data records"));
    }
    let records = total / samples_per_record;
    let (digital_min, digital_max) = match variant {
        EdfVariant::Edf => (-32768i64, 32767i64),
        EdfVariant::Bdf => (-8_388_608, 8_388_607),
    };
    let mut header = Vec::with_capacity(FIXED_HEADER_LEN + signal_count * SIGNAL_HEADER_LEN);
    let field = |buf: &mut Vec<u8>, text: &str, width: usize| {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(width, b' ');
        buf.extend_from_slice(&bytes[..width]);
    };
    match variant {
        EdfVariant::Edf => field(&mut header, "0", 8),
        EdfVariant::Bdf => {
            header.push(0xFF);
            field(&mut header, "BIOSEMI", 7);
        }
    }
    field(&mut header, "X X X X", 80);
    field(&mut header, "Startdate X X X X", 80);
    field(&mut header, "01.01.24", 8);
    field(&mut header, "00.00.00", 8);
    field(&mut header, &(FIXED_HEADER_LEN + signal_count * SIGNAL_HEADER_LEN).to_string(), 8);
    field(&mut header, if variant == EdfVariant::Bdf { "24BIT" } else { "" }, 44);
    field(&mut header, &records.to_string(), 8);
    field(&mut header, &record_duration_secs.to_string(), 8);
    field(&mut header, &signal_count.to_string(), 4);
    for label in labels {
        field(&mut header, label, 16);
    }
    for _ in labels {
        field(&mut header, "AgAgCl electrode", 80);
    }
    for _ in labels {
        field(&mut header, "uV", 8);
    }
    for _ in labels {
        field(&mut header, &digital_min.to_string(), 8);
    }
    for _ in labels {
        field(&mut header, &digital_max.to_string(), 8);
    }
    for _ in labels {
        field(&mut header, &digital_min.to_string(), 8);
    }
    for _ in labels {
        field(&mut header, &digital_max.to_string(), 8);
    }
    for _ in labels {
        field(&mut header, "", 80);
    }
    for _ in labels {
        field(&mut header, &samples_per_record.to_string(), 8);
    }
    for _ in labels {
        field(&mut header, "", 32);
    }
    let mut file = std::io::BufWriter::new(File::create(path)?);
    file.write_all(&header)?;
    let mut word = [0u8; 3];
    for record in 0..records {
        for column in digital {
            for &value in &column[record * samples_per_record..(record + 1) * samples_per_record] {
                match variant {
                    EdfVariant::Edf => {
                        LittleEndian::write_i16(&mut word[..2], value as i16);
                        file.write_all(&word[..2])?;
                    }
                    EdfVariant::Bdf => {
                        LittleEndian::write_i24(&mut word, value);
                        file.write_all(&word)?;
                    }
                }
            }
        }
    }
    file.flush()?;
    Ok(())
}
