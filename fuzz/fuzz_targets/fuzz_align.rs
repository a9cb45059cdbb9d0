#![no_main]

use la_align::{AlignOptions, JoinMode, align};
use la_buffer::NdBuffer;
use la_label::{Label, LabelList};
use la_larry::Larry;
use libfuzzer_sys::fuzz_target;

const MODES: [JoinMode; 4] = [JoinMode::Inner, JoinMode::Outer, JoinMode::Left, JoinMode::Right];

/// Unique labels from the low nibble of each byte, first occurrence wins.
fn labels_from(bytes: &[u8]) -> LabelList {
    let mut labels: Vec<Label> = Vec::new();
    for byte in bytes {
        let label = Label::Int64(i64::from(byte & 0x0f));
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    LabelList::new(labels).unwrap_or_else(|_| LabelList::range(0))
}

fn larry_from(bytes: &[u8]) -> Option<Larry> {
    let labels = labels_from(bytes);
    let values = (0..labels.len()).map(|i| i as i64).collect();
    let buffer = NdBuffer::from_i64(&[labels.len()], values).ok()?;
    Larry::new(buffer, vec![labels]).ok()
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let (left, right) = rest.split_at(rest.len() / 2);
    let (Some(left), Some(right)) = (larry_from(left), larry_from(right)) else {
        return;
    };

    let options = AlignOptions::new()
        .with_join(MODES[usize::from(selector % 4)])
        .with_allow_cast(selector & 0x10 == 0);
    if let Ok((out1, out2)) = align(&left, &right, &options) {
        assert_eq!(out1.labels(), out2.labels());
        assert_eq!(out1.shape(), out2.shape());
    }
});
