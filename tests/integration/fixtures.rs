// Test fixtures with known texts and dictionaries
// WHY: Golden testing requires deterministic input/output pairs

/// Foreign words with native replacements, tab-separated
pub const DICTIONARY_TSV: &str = "# foreign\tnative
커피\t다방차
인터넷\t누리망
인터\t사이
컴퓨터\t셈틀
이메일\t누리편지
";

/// One complete sentence with a single flagged word
pub const SIMPLE_TEXT: &str = "오늘 커피를 마셨다.";

/// Several paragraphs; the last one is still being typed
pub const MULTI_PARAGRAPH_TEXT: &str = "인터넷으로 컴퓨터를 샀다. 이메일도 보냈다.
아무 외래어도 없는 문장이다.
커피 한 잔";

/// Expected markers for MULTI_PARAGRAPH_TEXT in document order
pub const MULTI_PARAGRAPH_MARKERS: &[(&str, &str)] = &[
    ("인터넷", "누리망"),
    ("컴퓨터", "셈틀"),
    ("이메일", "누리편지"),
    ("커피", "다방차"),
];

/// MULTI_PARAGRAPH_TEXT with every suggestion accepted
pub const MULTI_PARAGRAPH_APPLIED: &str = "누리망으로 셈틀를 샀다. 누리편지도 보냈다.
아무 외래어도 없는 문장이다.
다방차 한 잔";
