//! Barcode probing over a rasterised page.
//!
//! [`RxingBarcodeProbe`] decodes QR Code, Code 128 and EAN-13 with the
//! `rxing` port of ZXing. Other readers plug in through [`BarcodeProbe`].

use crate::error::LabelScanError;
use crate::pipeline::render::RasterPage;
use image::imageops;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Report text when the probe found nothing.
pub const NO_BARCODE_MESSAGE: &str = "Nenhum código de barras detectado.";

/// Report text when the probe itself failed.
pub const PROBE_ERROR_MESSAGE: &str = "Erro ao processar a imagem para detectar código de barras.";

/// Symbologies a probe is expected to recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarcodeFormat {
    QrCode,
    Code128,
    Ean13,
}

impl BarcodeFormat {
    pub const ALL: [BarcodeFormat; 3] = [
        BarcodeFormat::QrCode,
        BarcodeFormat::Code128,
        BarcodeFormat::Ean13,
    ];
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BarcodeFormat::QrCode => "QR Code",
            BarcodeFormat::Code128 => "Code 128",
            BarcodeFormat::Ean13 => "EAN-13",
        })
    }
}

/// A decoded code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barcode {
    pub format: BarcodeFormat,
    pub value: String,
}

/// Best-effort structured-code reader.
pub trait BarcodeProbe: Send + Sync {
    /// Decode the first code found on the page, if any.
    fn probe(&self, page: &RasterPage) -> Result<Option<Barcode>, LabelScanError>;
}

/// ZXing-style decoder over the page's luma plane.
#[derive(Debug, Clone, Copy, Default)]
pub struct RxingBarcodeProbe;

impl RxingBarcodeProbe {
    fn map_format(format: &rxing::BarcodeFormat) -> Option<BarcodeFormat> {
        match format {
            rxing::BarcodeFormat::QR_CODE => Some(BarcodeFormat::QrCode),
            rxing::BarcodeFormat::CODE_128 => Some(BarcodeFormat::Code128),
            rxing::BarcodeFormat::EAN_13 => Some(BarcodeFormat::Ean13),
            _ => None,
        }
    }
}

impl BarcodeProbe for RxingBarcodeProbe {
    fn probe(&self, page: &RasterPage) -> Result<Option<Barcode>, LabelScanError> {
        let luma = imageops::grayscale(page.image());
        let (width, height) = luma.dimensions();
        if width == 0 || height == 0 {
            return Ok(None);
        }

        // The decoder reports "nothing found" and unreadable symbols as errors.
        let result = match rxing::helpers::detect_in_luma(luma.into_raw(), width, height, None) {
            Ok(r) => r,
            Err(e) => {
                debug!("No barcode on '{}': {:?}", page.source().name, e);
                return Ok(None);
            }
        };

        match Self::map_format(result.getBarcodeFormat()) {
            Some(format) => Ok(Some(Barcode {
                format,
                value: result.getText().to_string(),
            })),
            None => {
                debug!(
                    "Ignoring {:?} code on '{}'",
                    result.getBarcodeFormat(),
                    page.source().name
                );
                Ok(None)
            }
        }
    }
}


/// Run a probe and render the one-line report shown next to a page.
pub fn describe_probe(probe: &dyn BarcodeProbe, page: &RasterPage) -> String {
    match probe.probe(page) {
        Ok(Some(code)) => format!("{} ({})", code.value, code.format),
        Ok(None) => NO_BARCODE_MESSAGE.to_string(),
        Err(e) => {
            tracing::warn!("Barcode probe failed on '{}': {}", page.source().name, e);
            PROBE_ERROR_MESSAGE.to_string()
        }
    }
}
