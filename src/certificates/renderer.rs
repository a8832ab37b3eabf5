// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Share ownership certificate rendering.

use crate::models::{Money, PaymentMethod};
use crate::storage::{Member, PaymentPlan, Share};

use super::pdf::{Font, PdfDocument, PdfPage, A4_LANDSCAPE};
use super::spelled::amount_to_words;

/// Printed in place of optional data that is not on record.
pub const PLACEHOLDER: &str = "No registrado";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("certificate is missing required field: {0}")]
    MissingField(&'static str),

    #[error("nominal value overflows")]
    AmountOverflow,
}

/// Renders certificates for one club.
#[derive(Debug, Clone)]
pub struct CertificateRenderer {
    club_name: String,
    currency: String,
}

impl CertificateRenderer {
    pub fn new(club_name: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            club_name: club_name.into(),
            currency: currency.into(),
        }
    }

    /// Nominal value covered by the certificate.
    ///
    /// Taken from the plan's per-share value when a plan is on record, from
    /// the purchase price otherwise.
    pub fn nominal_value(share: &Share, plan: Option<&PaymentPlan>) -> Result<Money, RenderError> {
        let per_share = plan.map_or(share.unit_price, |plan| plan.nominal_value);
        per_share
            .checked_mul(share.unit_count)
            .ok_or(RenderError::AmountOverflow)
    }

    /// Render the certificate as PDF bytes.
    ///
    /// The same inputs always produce the same bytes.
    pub fn render(
        &self,
        share: &Share,
        member: &Member,
        plan: Option<&PaymentPlan>,
    ) -> Result<Vec<u8>, RenderError> {
        let number = share.certificate_number.trim();
        if number.is_empty() {
            return Err(RenderError::MissingField("certificate number"));
        }
        let holder = member.full_name.trim();
        if holder.is_empty() {
            return Err(RenderError::MissingField("member full name"));
        }

        let nominal = Self::nominal_value(share, plan)?;
        let identity = non_empty(member.identity_number.as_deref()).unwrap_or(PLACEHOLDER);
        let share_type = non_empty(Some(share.share_type.as_str())).unwrap_or(PLACEHOLDER);
        let plan_name = non_empty(plan.map(|p| p.name.as_str())).unwrap_or(PLACEHOLDER);
        let units = if share.unit_count == 1 {
            "1 acción".to_string()
        } else {
            format!("{} acciones", share.unit_count)
        };

        let (width, height) = A4_LANDSCAPE;
        let mut page = PdfPage::new(width, height);
        page.rect(20.0, 20.0, width - 40.0, height - 40.0, 3.0);
        page.rect(30.0, 30.0, width - 60.0, height - 60.0, 1.0);

        page.centered_text(Font::Bold, 28.0, 500.0, &self.club_name.to_uppercase());
        page.centered_text(Font::Bold, 22.0, 455.0, "CERTIFICADO DE ACCIÓN");
        page.centered_text(Font::Regular, 14.0, 425.0, &format!("Certificado N.º {number}"));

        page.centered_text(Font::Regular, 13.0, 380.0, "Se certifica que");
        page.centered_text(Font::Bold, 20.0, 350.0, holder);
        page.centered_text(
            Font::Regular,
            13.0,
            322.0,
            &format!("con documento de identidad {identity}"),
        );
        page.centered_text(
            Font::Regular,
            13.0,
            294.0,
            &format!("es titular de {units} de tipo {share_type}, con un valor nominal de"),
        );
        page.centered_text(
            Font::Bold,
            16.0,
            264.0,
            &format!("{} {nominal}", self.currency),
        );
        page.centered_text(
            Font::Oblique,
            11.0,
            242.0,
            &format!("({})", amount_to_words(nominal, &self.currency).to_uppercase()),
        );

        page.text(Font::Regular, 11.0, 80.0, 200.0, &format!("Plan de pago: {plan_name}"));
        page.text(
            Font::Regular,
            11.0,
            80.0,
            182.0,
            &format!("Forma de pago: {}", method_label(share.payment_method)),
        );
        page.text(
            Font::Regular,
            11.0,
            80.0,
            164.0,
            &format!("Fecha de emisión: {}", share.issued_at.format("%d/%m/%Y")),
        );

        page.line(140.0, 95.0, 340.0, 95.0, 0.8);
        page.line(500.0, 95.0, 700.0, 95.0, 0.8);
        page.text(Font::Regular, 11.0, 212.0, 80.0, "Presidente");
        page.text(Font::Regular, 11.0, 577.0, 80.0, "Tesorero");

        page.text(
            Font::Oblique,
            8.0,
            45.0,
            40.0,
            &format!("Referencia de pago: {}", share.reference),
        );

        let mut doc = PdfDocument::new(format!("Certificado {number}"));
        doc.add_page(page);
        Ok(doc.to_bytes())
    }
}

fn method_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Card => "Tarjeta",
        PaymentMethod::Wallet => "Billetera MercadoPago",
        PaymentMethod::Paypal => "PayPal",
        PaymentMethod::Transfer => "Transferencia bancaria",
        PaymentMethod::Cash => "Efectivo",
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
