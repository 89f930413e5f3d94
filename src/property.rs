//! Property metadata: initial values, inheritance, and the layered-property
//! master table used for cyclic shorthand expansion.

/// Master property whose comma-separated layer count drives the expansion of
/// the given sub-property, if the property belongs to a layered family.
pub fn master_property(property: &str) -> Option<&'static str> {
    const TABLE: &[(&str, &str)] = &[
        ("background-", "background-image"),
        ("animation-", "animation-name"),
        ("transition-", "transition-property"),
        ("mask-", "mask-image"),
    ];
    for (prefix, master) in TABLE {
        if property.starts_with(prefix) && property != *master {
            return Some(master);
        }
    }
    None
}

/// Layered families compared item-wise without a master length (the layer
/// structure is positional, not count-driven).
pub fn is_item_layered(property: &str) -> bool {
    property.starts_with("grid-") || property.starts_with("border-image-")
}

pub fn is_inherited(property: &str) -> bool {
    matches!(
        property,
        "color"
            | "cursor"
            | "direction"
            | "font"
            | "font-family"
            | "font-size"
            | "font-style"
            | "font-variant"
            | "font-weight"
            | "letter-spacing"
            | "line-height"
            | "list-style"
            | "list-style-image"
            | "list-style-position"
            | "list-style-type"
            | "quotes"
            | "text-align"
            | "text-indent"
            | "text-transform"
            | "visibility"
            | "white-space"
            | "word-break"
            | "word-spacing"
            | "word-wrap"
            | "overflow-wrap"
    ) || property.starts_with("border-spacing")
        || property.starts_with("caption-")
}

/// Declared initial value, for the properties this oracle knows about. The
/// table is deliberately partial: an unknown property yields `None` and the
/// initial-value equivalence heuristic simply does not fire for it.
pub fn initial_value(property: &str) -> Option<&'static str> {
    let value = match property {
        "background-attachment" => "scroll",
        "background-clip" => "border-box",
        "background-color" => "transparent",
        "background-image" => "none",
        "background-origin" => "padding-box",
        "background-position" => "0% 0%",
        "background-repeat" => "repeat",
        "background-size" => "auto auto",
        "border-collapse" => "separate",
        "border-image-outset" => "0",
        "border-image-repeat" => "stretch",
        "border-image-slice" => "100%",
        "border-image-source" => "none",
        "border-image-width" => "1",
        "bottom" | "left" | "right" | "top" => "auto",
        "clear" => "none",
        "content" => "normal",
        "cursor" => "auto",
        "direction" => "ltr",
        "display" => "inline",
        "float" => "none",
        "font-size" => "medium",
        "font-style" | "font-variant" | "font-weight" => "normal",
        "height" | "width" => "auto",
        "letter-spacing" | "word-spacing" => "normal",
        "line-height" => "normal",
        "list-style-image" => "none",
        "list-style-position" => "outside",
        "list-style-type" => "disc",
        "margin-bottom" | "margin-left" | "margin-right" | "margin-top" => "0",
        "max-height" | "max-width" => "none",
        "min-height" | "min-width" => "0",
        "opacity" => "1",
        "outline-style" => "none",
        "overflow" => "visible",
        "padding-bottom" | "padding-left" | "padding-right" | "padding-top" => "0",
        "position" => "static",
        "text-align" => "start",
        "text-decoration" | "text-decoration-line" => "none",
        "text-indent" => "0",
        "text-transform" => "none",
        "transform" => "none",
        "transition-delay" | "transition-duration" => "0s",
        "transition-property" => "all",
        "transition-timing-function" => "ease",
        "vertical-align" => "baseline",
        "visibility" => "visible",
        "white-space" => "normal",
        "z-index" => "auto",
        _ => return None,
    };
    Some(value)
}
