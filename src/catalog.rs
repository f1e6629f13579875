//! The static patch catalogue: which files get touched and what happens to
//! them. Pure data, no traversal logic; the engines consume it. Patterns and
//! rule trees are expressed against the default 1920x1080 geometry.

use crate::binary::{Axis, PatternOverride, PatternSpec, Segment};
use crate::document::{DefaultValue, FieldUpsert, Rule, SelectorRule, Transform};

/// One engine binary variant shipped by the game.
pub struct EngineTarget {
    pub name: &'static str,
    pub path: &'static str,
    /// Per-variant pattern adjustments, merged over the base patterns.
    pub overrides: &'static [PatternOverride],
}

/// One structured UI-layout document and its rule tree.
pub struct DocumentTarget {
    pub path: &'static str,
    pub rule: Rule,
}

pub struct Catalog {
    pub engines: &'static [EngineTarget],
    pub patterns: &'static [PatternSpec],
    pub documents: &'static [DocumentTarget],
}

impl Catalog {
    /// Relative paths of every file a patch run may touch, engines first.
    pub fn tracked_files(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.engines
            .iter()
            .map(|e| e.path)
            .chain(self.documents.iter().map(|d| d.path))
    }
}

pub fn default() -> &'static Catalog {
    &DEFAULT
}

/// `mov dword ptr [rip+disp32], imm32`: opcode `C7 05`, a 4-byte displacement
/// we skip over, then the immediate holding the hardcoded dimension. Each
/// supported build stores both dimensions twice.
const VIEWPORT_PATTERNS: &[PatternSpec] = &[
    PatternSpec {
        name: "viewport-width",
        segments: &[
            Segment::Lit(&[0xc7, 0x05]),
            Segment::Any(4),
            Segment::U32(Axis::Width),
        ],
        expected: 2,
    },
    PatternSpec {
        name: "viewport-height",
        segments: &[
            Segment::Lit(&[0xc7, 0x05]),
            Segment::Any(4),
            Segment::U32(Axis::Height),
        ],
        expected: 2,
    },
];

const ENGINES: &[EngineTarget] = &[
    EngineTarget {
        name: "DirectX",
        path: "x64/EngineWin64s.dll",
        overrides: &[],
    },
    EngineTarget {
        name: "Vulkan",
        path: "x64Vk/EngineWin64sv.dll",
        overrides: &[],
    },
    EngineTarget {
        name: "32-bit",
        path: "x86/EngineWin32s.dll",
        overrides: &[],
    },
];

// Shared item rules. Backgrounds are blown up uniformly so they still cover
// the whole screen; panels keep their offset from whichever edge or center
// they were designed against.

const BACKGROUND_TILE: SelectorRule = SelectorRule {
    match_field: "Name",
    match_value: "BackgroundTile",
    fields: &[
        FieldUpsert {
            field: "ScaleX",
            transform: Transform::ScaleUniform,
            default: DefaultValue::Float(1.0),
        },
        FieldUpsert {
            field: "ScaleY",
            transform: Transform::ScaleUniform,
            default: DefaultValue::Float(1.0),
        },
    ],
};

const MAIN_MENU_RULE: Rule = Rule::Fields(&[(
    "UIScreen",
    Rule::Fields(&[
        ("Width", Rule::Apply(Transform::FullWidth)),
        ("Height", Rule::Apply(Transform::FullHeight)),
        (
            "Items",
            Rule::Each(&[
                BACKGROUND_TILE,
                SelectorRule {
                    match_field: "Name",
                    match_value: "TitleLogo",
                    fields: &[FieldUpsert {
                        field: "X",
                        transform: Transform::RecenterX,
                        default: DefaultValue::Int(960),
                    }],
                },
                SelectorRule {
                    match_field: "Name",
                    match_value: "MenuButtons",
                    fields: &[
                        FieldUpsert {
                            field: "X",
                            transform: Transform::RecenterX,
                            default: DefaultValue::Int(960),
                        },
                        FieldUpsert {
                            field: "Y",
                            transform: Transform::OffsetBottomY,
                            default: DefaultValue::Int(900),
                        },
                    ],
                },
                SelectorRule {
                    match_field: "Name",
                    match_value: "VersionLabel",
                    fields: &[
                        FieldUpsert {
                            field: "X",
                            transform: Transform::OffsetRightX,
                            default: DefaultValue::Int(1860),
                        },
                        FieldUpsert {
                            field: "Y",
                            transform: Transform::OffsetBottomY,
                            default: DefaultValue::Int(1040),
                        },
                    ],
                },
            ]),
        ),
    ]),
)]);

const PAUSE_RULE: Rule = Rule::Fields(&[(
    "UIScreen",
    Rule::Fields(&[
        ("Width", Rule::Apply(Transform::FullWidth)),
        ("Height", Rule::Apply(Transform::FullHeight)),
        (
            "Items",
            Rule::Each(&[
                BACKGROUND_TILE,
                SelectorRule {
                    match_field: "Name",
                    match_value: "PauseMenu",
                    fields: &[
                        FieldUpsert {
                            field: "X",
                            transform: Transform::RecenterX,
                            default: DefaultValue::Int(960),
                        },
                        FieldUpsert {
                            field: "Y",
                            transform: Transform::RecenterY,
                            default: DefaultValue::Int(540),
                        },
                    ],
                },
            ]),
        ),
    ]),
)]);

const SETTINGS_RULE: Rule = Rule::Fields(&[(
    "UIScreen",
    Rule::Fields(&[
        ("Width", Rule::Apply(Transform::FullWidth)),
        ("Height", Rule::Apply(Transform::FullHeight)),
        (
            "Items",
            Rule::Each(&[
                BACKGROUND_TILE,
                SelectorRule {
                    match_field: "Name",
                    match_value: "LeftColumn",
                    fields: &[FieldUpsert {
                        field: "X",
                        transform: Transform::RecenterX,
                        default: DefaultValue::Int(640),
                    }],
                },
                SelectorRule {
                    match_field: "Name",
                    match_value: "RightColumn",
                    fields: &[FieldUpsert {
                        field: "X",
                        transform: Transform::RecenterX,
                        default: DefaultValue::Int(1280),
                    }],
                },
                SelectorRule {
                    match_field: "Name",
                    match_value: "FooterPrompts",
                    fields: &[FieldUpsert {
                        field: "Y",
                        transform: Transform::OffsetBottomY,
                        default: DefaultValue::Int(1020),
                    }],
                },
            ]),
        ),
    ]),
)]);

/// The save-slot grid is laid out against an explicit bounds box; all four
/// edges track the moving center.
const LOAD_SAVE_RULE: Rule = Rule::Fields(&[(
    "UIScreen",
    Rule::Fields(&[
        ("Width", Rule::Apply(Transform::FullWidth)),
        ("Height", Rule::Apply(Transform::FullHeight)),
        (
            "SlotBounds",
            Rule::Fields(&[
                ("MinX", Rule::Apply(Transform::RecenterX)),
                ("MaxX", Rule::Apply(Transform::RecenterX)),
                ("MinY", Rule::Apply(Transform::RecenterY)),
                ("MaxY", Rule::Apply(Transform::RecenterY)),
            ]),
        ),
        (
            "Items",
            Rule::Each(&[
                BACKGROUND_TILE,
                SelectorRule {
                    match_field: "Name",
                    match_value: "SlotHighlight",
                    fields: &[FieldUpsert {
                        field: "X",
                        transform: Transform::RecenterX,
                        default: DefaultValue::Int(960),
                    }],
                },
            ]),
        ),
    ]),
)]);

const KEY_MAPPING_RULE: Rule = Rule::Fields(&[(
    "UIScreen",
    Rule::Fields(&[
        ("Width", Rule::Apply(Transform::FullWidth)),
        ("Height", Rule::Apply(Transform::FullHeight)),
        (
            "Items",
            Rule::Each(&[
                BACKGROUND_TILE,
                SelectorRule {
                    match_field: "Name",
                    match_value: "BindingList",
                    fields: &[FieldUpsert {
                        field: "X",
                        transform: Transform::RecenterX,
                        default: DefaultValue::Int(960),
                    }],
                },
                SelectorRule {
                    match_field: "Name",
                    match_value: "ResetPrompt",
                    fields: &[FieldUpsert {
                        field: "Y",
                        transform: Transform::OffsetBottomY,
                        default: DefaultValue::Int(1000),
                    }],
                },
            ]),
        ),
    ]),
)]);

const MESSAGE_DIALOG_RULE: Rule = Rule::Fields(&[(
    "UIScreen",
    Rule::Fields(&[
        ("Width", Rule::Apply(Transform::FullWidth)),
        ("Height", Rule::Apply(Transform::FullHeight)),
        (
            "Items",
            Rule::Each(&[
                SelectorRule {
                    match_field: "Name",
                    match_value: "DialogShadow",
                    fields: &[
                        FieldUpsert {
                            field: "ScaleX",
                            transform: Transform::ScaleUniform,
                            default: DefaultValue::Float(1.0),
                        },
                        FieldUpsert {
                            field: "ScaleY",
                            transform: Transform::ScaleUniform,
                            default: DefaultValue::Float(1.0),
                        },
                    ],
                },
                SelectorRule {
                    match_field: "Name",
                    match_value: "DialogFrame",
                    fields: &[
                        FieldUpsert {
                            field: "X",
                            transform: Transform::RecenterX,
                            default: DefaultValue::Int(960),
                        },
                        FieldUpsert {
                            field: "Y",
                            transform: Transform::RecenterY,
                            default: DefaultValue::Int(540),
                        },
                    ],
                },
            ]),
        ),
    ]),
)]);

const EXIT_CONFIRM_RULE: Rule = Rule::Fields(&[(
    "UIScreen",
    Rule::Fields(&[
        ("Width", Rule::Apply(Transform::FullWidth)),
        ("Height", Rule::Apply(Transform::FullHeight)),
        (
            "Items",
            Rule::Each(&[SelectorRule {
                match_field: "Name",
                match_value: "ConfirmPrompt",
                fields: &[
                    FieldUpsert {
                        field: "X",
                        transform: Transform::RecenterX,
                        default: DefaultValue::Int(960),
                    },
                    FieldUpsert {
                        field: "Y",
                        transform: Transform::RecenterY,
                        default: DefaultValue::Int(540),
                    },
                ],
            }]),
        ),
    ]),
)]);

/// HUD elements are edge-anchored; the left-anchored ones are deliberately
/// absent here and stay untouched.
const IN_GAME_UI_RULE: Rule = Rule::Fields(&[(
    "UIScreen",
    Rule::Fields(&[
        ("Width", Rule::Apply(Transform::FullWidth)),
        ("Height", Rule::Apply(Transform::FullHeight)),
        (
            "GamepadFreeForm",
            Rule::Fields(&[(
                "FreeFormSelectMaxGridDistance",
                Rule::Apply(Transform::RecenterX),
            )]),
        ),
        (
            "Items",
            Rule::Each(&[
                SelectorRule {
                    match_field: "Name",
                    match_value: "HealthBar",
                    fields: &[FieldUpsert {
                        field: "Y",
                        transform: Transform::OffsetBottomY,
                        default: DefaultValue::Int(1030),
                    }],
                },
                SelectorRule {
                    match_field: "Name",
                    match_value: "ResourceTray",
                    fields: &[
                        FieldUpsert {
                            field: "X",
                            transform: Transform::OffsetRightX,
                            default: DefaultValue::Int(1880),
                        },
                        FieldUpsert {
                            field: "Y",
                            transform: Transform::OffsetBottomY,
                            default: DefaultValue::Int(1030),
                        },
                    ],
                },
                SelectorRule {
                    match_field: "Name",
                    match_value: "BossBar",
                    fields: &[FieldUpsert {
                        field: "X",
                        transform: Transform::RecenterX,
                        default: DefaultValue::Int(960),
                    }],
                },
                SelectorRule {
                    match_field: "Name",
                    match_value: "ObjectiveText",
                    fields: &[FieldUpsert {
                        field: "X",
                        transform: Transform::OffsetRightX,
                        default: DefaultValue::Int(1700),
                    }],
                },
            ]),
        ),
    ]),
)]);

const DOCUMENTS: &[DocumentTarget] = &[
    DocumentTarget {
        path: "Content/Game/GUI/MainMenuScreen.sjson",
        rule: MAIN_MENU_RULE,
    },
    DocumentTarget {
        path: "Content/Game/GUI/PauseScreen.sjson",
        rule: PAUSE_RULE,
    },
    DocumentTarget {
        path: "Content/Game/GUI/SettingsMenuScreen.sjson",
        rule: SETTINGS_RULE,
    },
    DocumentTarget {
        path: "Content/Game/GUI/LoadSaveScreen.sjson",
        rule: LOAD_SAVE_RULE,
    },
    DocumentTarget {
        path: "Content/Game/GUI/KeyMappingScreen.sjson",
        rule: KEY_MAPPING_RULE,
    },
    DocumentTarget {
        path: "Content/Game/GUI/MessageDialog.sjson",
        rule: MESSAGE_DIALOG_RULE,
    },
    DocumentTarget {
        path: "Content/Game/GUI/ExitConfirmDialog.sjson",
        rule: EXIT_CONFIRM_RULE,
    },
    DocumentTarget {
        path: "Content/Game/GUI/InGameUI.sjson",
        rule: IN_GAME_UI_RULE,
    },
];

static DEFAULT: Catalog = Catalog {
    engines: ENGINES,
    patterns: VIEWPORT_PATTERNS,
    documents: DOCUMENTS,
};
