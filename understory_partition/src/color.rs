// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Color transforms concatenated down the node hierarchy.

/// Per-channel multiply and offset applied to rendered colors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorTransform {
    /// Red channel multiplier.
    pub red_multiplier: f64,
    /// Green channel multiplier.
    pub green_multiplier: f64,
    /// Blue channel multiplier.
    pub blue_multiplier: f64,
    /// Alpha channel multiplier.
    pub alpha_multiplier: f64,
    /// Red channel offset.
    pub red_offset: f64,
    /// Green channel offset.
    pub green_offset: f64,
    /// Blue channel offset.
    pub blue_offset: f64,
    /// Alpha channel offset.
    pub alpha_offset: f64,
}

impl Default for ColorTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ColorTransform {
    /// The transform that leaves colors unchanged.
    pub const IDENTITY: Self = Self {
        red_multiplier: 1.0,
        green_multiplier: 1.0,
        blue_multiplier: 1.0,
        alpha_multiplier: 1.0,
        red_offset: 0.0,
        green_offset: 0.0,
        blue_offset: 0.0,
        alpha_offset: 0.0,
    };

    /// Identity transform with the given alpha multiplier.
    pub const fn with_alpha(alpha: f64) -> Self {
        Self {
            alpha_multiplier: alpha,
            ..Self::IDENTITY
        }
    }

    /// Applies `inner` before `self`.
    ///
    /// The result maps a color through `inner` first and then through the
    /// previous value of `self`.
    pub fn prepend(&mut self, inner: &Self) {
        self.red_offset += inner.red_offset * self.red_multiplier;
        self.green_offset += inner.green_offset * self.green_multiplier;
        self.blue_offset += inner.blue_offset * self.blue_multiplier;
        self.alpha_offset += inner.alpha_offset * self.alpha_multiplier;
        self.red_multiplier *= inner.red_multiplier;
        self.green_multiplier *= inner.green_multiplier;
        self.blue_multiplier *= inner.blue_multiplier;
        self.alpha_multiplier *= inner.alpha_multiplier;
    }

    /// Returns `true` unless the transform makes everything fully transparent.
    pub fn is_renderable(&self) -> bool {
        self.alpha_multiplier != 0.0 || self.alpha_offset > 0.0
    }
}
