//! The static operator table: content-stream mnemonics, their opcodes and
//! operand arities.

/// Every instruction the operator list can carry.
///
/// Most variants correspond one-to-one with content-stream operators; the
/// tail of the enum holds instructions only the evaluator synthesizes
/// (dependencies, coalesced paths, image paints, groups).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    SetLineWidth,
    SetLineCap,
    SetLineJoin,
    SetMiterLimit,
    SetDash,
    SetRenderingIntent,
    SetFlatness,
    SetGState,
    Save,
    Restore,
    Transform,
    MoveTo,
    LineTo,
    CurveTo,
    CurveTo2,
    CurveTo3,
    ClosePath,
    Rectangle,
    Stroke,
    CloseStroke,
    Fill,
    EoFill,
    FillStroke,
    EoFillStroke,
    CloseFillStroke,
    CloseEoFillStroke,
    EndPath,
    Clip,
    EoClip,
    BeginText,
    EndText,
    SetCharSpacing,
    SetWordSpacing,
    SetHScale,
    SetLeading,
    SetFont,
    SetTextRenderingMode,
    SetTextRise,
    MoveText,
    SetLeadingMoveText,
    SetTextMatrix,
    NextLine,
    ShowText,
    ShowSpacedText,
    NextLineShowText,
    NextLineSetSpacingShowText,
    SetCharWidth,
    SetCharWidthAndBounds,
    SetStrokeColorSpace,
    SetFillColorSpace,
    SetStrokeColor,
    SetFillColor,
    SetStrokeColorN,
    SetFillColorN,
    SetStrokeGray,
    SetFillGray,
    SetStrokeRgbColor,
    SetFillRgbColor,
    SetStrokeCmykColor,
    SetFillCmykColor,
    ShadingFill,
    BeginInlineImage,
    EndInlineImage,
    PaintXObject,
    MarkPoint,
    MarkPointProps,
    BeginMarkedContent,
    BeginMarkedContentProps,
    EndMarkedContent,
    BeginCompat,
    EndCompat,
    // Synthesized by the evaluator.
    Dependency,
    ConstructPath,
    PaintFormXObjectBegin,
    PaintFormXObjectEnd,
    PaintImageXObject,
    PaintInlineImageXObject,
    PaintImageMaskXObject,
    BeginGroup,
    EndGroup,
}

impl OpCode {
    /// Path-construction opcodes are the ones that count toward the
    /// malformed-operator threshold.
    pub fn is_path_op(self) -> bool {
        matches!(
            self,
            OpCode::MoveTo
                | OpCode::LineTo
                | OpCode::CurveTo
                | OpCode::CurveTo2
                | OpCode::CurveTo3
                | OpCode::ClosePath
                | OpCode::Rectangle
        )
    }

    /// Opcodes that paint or end the current path.
    pub fn is_path_paint_op(self) -> bool {
        matches!(
            self,
            OpCode::Stroke
                | OpCode::CloseStroke
                | OpCode::Fill
                | OpCode::EoFill
                | OpCode::FillStroke
                | OpCode::EoFillStroke
                | OpCode::CloseFillStroke
                | OpCode::CloseEoFillStroke
                | OpCode::EndPath
        )
    }
}

/// Arity of a content-stream operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpInfo {
    pub op: OpCode,
    /// Exact operand count for fixed-arity operators.
    pub num_args: usize,
    /// Variable-arity operators accept any operand count up to a sanity
    /// bound.
    pub variable: bool,
}

const fn fixed(op: OpCode, num_args: usize) -> OpInfo {
    OpInfo {
        op,
        num_args,
        variable: false,
    }
}

const fn variable(op: OpCode, min_args: usize) -> OpInfo {
    OpInfo {
        op,
        num_args: min_args,
        variable: true,
    }
}

/// Look up a content-stream mnemonic.
pub fn lookup(mnemonic: &str) -> Option<OpInfo> {
    use OpCode::*;

    Some(match mnemonic {
        "w" => fixed(SetLineWidth, 1),
        "J" => fixed(SetLineCap, 1),
        "j" => fixed(SetLineJoin, 1),
        "M" => fixed(SetMiterLimit, 1),
        "d" => fixed(SetDash, 2),
        "ri" => fixed(SetRenderingIntent, 1),
        "i" => fixed(SetFlatness, 1),
        "gs" => fixed(SetGState, 1),
        "q" => fixed(Save, 0),
        "Q" => fixed(Restore, 0),
        "cm" => fixed(Transform, 6),
        "m" => fixed(MoveTo, 2),
        "l" => fixed(LineTo, 2),
        "c" => fixed(CurveTo, 6),
        "v" => fixed(CurveTo2, 4),
        "y" => fixed(CurveTo3, 4),
        "h" => fixed(ClosePath, 0),
        "re" => fixed(Rectangle, 4),
        "S" => fixed(Stroke, 0),
        "s" => fixed(CloseStroke, 0),
        "f" | "F" => fixed(Fill, 0),
        "f*" => fixed(EoFill, 0),
        "B" => fixed(FillStroke, 0),
        "B*" => fixed(EoFillStroke, 0),
        "b" => fixed(CloseFillStroke, 0),
        "b*" => fixed(CloseEoFillStroke, 0),
        "n" => fixed(EndPath, 0),
        "W" => fixed(Clip, 0),
        "W*" => fixed(EoClip, 0),
        "BT" => fixed(BeginText, 0),
        "ET" => fixed(EndText, 0),
        "Tc" => fixed(SetCharSpacing, 1),
        "Tw" => fixed(SetWordSpacing, 1),
        "Tz" => fixed(SetHScale, 1),
        "TL" => fixed(SetLeading, 1),
        "Tf" => fixed(SetFont, 2),
        "Tr" => fixed(SetTextRenderingMode, 1),
        "Ts" => fixed(SetTextRise, 1),
        "Td" => fixed(MoveText, 2),
        "TD" => fixed(SetLeadingMoveText, 2),
        "Tm" => fixed(SetTextMatrix, 6),
        "T*" => fixed(NextLine, 0),
        "Tj" => fixed(ShowText, 1),
        "TJ" => fixed(ShowSpacedText, 1),
        "'" => fixed(NextLineShowText, 1),
        "\"" => fixed(NextLineSetSpacingShowText, 3),
        "d0" => fixed(SetCharWidth, 2),
        "d1" => fixed(SetCharWidthAndBounds, 6),
        "CS" => fixed(SetStrokeColorSpace, 1),
        "cs" => fixed(SetFillColorSpace, 1),
        "SC" => variable(SetStrokeColor, 1),
        "sc" => variable(SetFillColor, 1),
        "SCN" => variable(SetStrokeColorN, 1),
        "scn" => variable(SetFillColorN, 1),
        "G" => fixed(SetStrokeGray, 1),
        "g" => fixed(SetFillGray, 1),
        "RG" => fixed(SetStrokeRgbColor, 3),
        "rg" => fixed(SetFillRgbColor, 3),
        "K" => fixed(SetStrokeCmykColor, 4),
        "k" => fixed(SetFillCmykColor, 4),
        "sh" => fixed(ShadingFill, 1),
        "BI" => variable(BeginInlineImage, 0),
        "ID" => variable(EndInlineImage, 0),
        "EI" => fixed(EndInlineImage, 0),
        "Do" => fixed(PaintXObject, 1),
        "MP" => fixed(MarkPoint, 1),
        "DP" => fixed(MarkPointProps, 2),
        "BMC" => fixed(BeginMarkedContent, 1),
        "BDC" => fixed(BeginMarkedContentProps, 2),
        "EMC" => fixed(EndMarkedContent, 0),
        "BX" => fixed(BeginCompat, 0),
        "EX" => fixed(EndCompat, 0),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonic_lookup() {
        assert_eq!(lookup("re").unwrap().op, OpCode::Rectangle);
        assert_eq!(lookup("re").unwrap().num_args, 4);
        assert_eq!(lookup("f").unwrap().op, OpCode::Fill);
        assert_eq!(lookup("F").unwrap().op, OpCode::Fill);
        assert!(lookup("scn").unwrap().variable);
        assert!(lookup("nonsense").is_none());
    }

    #[test]
    fn path_op_classification() {
        assert!(OpCode::Rectangle.is_path_op());
        assert!(OpCode::MoveTo.is_path_op());
        assert!(!OpCode::Stroke.is_path_op());
        assert!(OpCode::Stroke.is_path_paint_op());
        assert!(OpCode::EndPath.is_path_paint_op());
    }
}
