//! End-to-end scenarios for the attribution and text algorithms.

use attnscope_core::attention::{
    attribute, flow, rollout, rollout_with, AttentionTensor, AttributionOptions, RolloutOptions,
    VisualizationMethod,
};
use attnscope_core::text::{align, resolve, SpanKind, TokenizerConvention};
use attnscope_core::{AttnError, Token};
use pretty_assertions::assert_eq;

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-6, "expected {expected}, got {actual}");
}

fn uniform(layers: usize, heads: usize, n: usize) -> AttentionTensor {
    AttentionTensor::new(layers, heads, n, vec![1.0 / n as f64; layers * heads * n * n]).unwrap()
}

#[test]
fn mask_word_in_sentence() {
    let tokens = Token::sequence(["[CLS]", "the", "cat", "sat", "on", "the", "mat", ".", "[SEP]"]);
    let target = resolve(
        &tokens,
        "the cat sat on the mat.",
        2,
        "X",
        TokenizerConvention::ContinuationMarked,
    )
    .unwrap();
    assert_eq!(target.modified_text, "the X sat on the mat.");
    assert_eq!(target.span_kind, SpanKind::Word);
}

#[test]
fn replace_single_period() {
    let tokens = Token::sequence(["[CLS]", "the", "cat", "sat", ".", "[SEP]"]);
    let target = resolve(&tokens, "The cat sat.", 4, "!", TokenizerConvention::ContinuationMarked)
        .unwrap();
    assert_eq!(target.modified_text, "The cat sat!");
    assert_eq!(target.span_kind, SpanKind::Punctuation);
}

#[test]
fn same_sentence_in_both_conventions() {
    let text = "The cat sat on the mat.";
    let bert = Token::sequence(["[CLS]", "the", "cat", "sat", "on", "the", "mat", ".", "[SEP]"]);
    let roberta = Token::sequence([
        "<s>", "The", "\u{120}cat", "\u{120}sat", "\u{120}on", "\u{120}the", "\u{120}mat", ".",
        "</s>",
    ]);
    let a = resolve(&bert, text, 6, "rug", TokenizerConvention::ContinuationMarked).unwrap();
    let b = resolve(&roberta, text, 6, "rug", TokenizerConvention::WordStartMarked).unwrap();
    assert_eq!(a.modified_text, "The cat sat on the rug.");
    assert_eq!(a.modified_text, b.modified_text);
}

#[test]
fn repeated_word_masked_where_selected() {
    let text = "the cat sat on the mat.";
    let bert = Token::sequence(["[CLS]", "the", "cat", "sat", "on", "the", "mat", ".", "[SEP]"]);
    let roberta = Token::sequence([
        "<s>", "the", "\u{120}cat", "\u{120}sat", "\u{120}on", "\u{120}the", "\u{120}mat", ".",
        "</s>",
    ]);
    for (tokens, convention) in [
        (&bert, TokenizerConvention::ContinuationMarked),
        (&roberta, TokenizerConvention::WordStartMarked),
    ] {
        let target = resolve(tokens, text, 5, "X", convention).unwrap();
        assert_eq!(target.modified_text, "the cat sat on X mat.", "{convention}");
        assert_eq!(target.position, 4);
    }
}

#[test]
fn uniform_rollout_without_identity_stays_uniform() {
    let m = rollout_with(&uniform(2, 1, 3), RolloutOptions { add_identity: false });
    for r in 0..3 {
        for c in 0..3 {
            assert_close(m.row(r)[c], 1.0 / 3.0);
        }
    }
}

#[test]
fn uniform_rollout_with_identity_favors_self() {
    let m = rollout(&uniform(2, 1, 3));
    for r in 0..3 {
        for c in 0..3 {
            assert_close(m.row(r)[c], if r == c { 0.5 } else { 0.25 });
        }
    }
}

#[test]
fn self_attending_token_sends_no_flow_elsewhere() {
    let n = 4;
    let mut data = Vec::new();
    for _layer in 0..3 {
        for q in 0..n {
            for k in 0..n {
                data.push(match (q, k) {
                    (0, 0) => 1.0,
                    (0, _) => 0.0,
                    _ => 1.0 / n as f64,
                });
            }
        }
    }
    let t = AttentionTensor::new(3, 1, n, data).unwrap();
    let m = flow(&t, Some(0)).unwrap();
    assert_eq!(m.rows(), 1);
    assert_close(m.row(0)[0], 1.0);
    for k in 1..n {
        assert_close(m.row(0)[k], 0.0);
    }
}

#[test]
fn flow_source_out_of_range() {
    let err = flow(&uniform(1, 1, 3), Some(3)).unwrap_err();
    assert!(matches!(err, AttnError::InvalidIndex { index: 3, len: 3 }));
}

#[test]
fn alignment_then_masking_agree() {
    let tokens = Token::sequence(["[CLS]", "she", "play", "##ed", "chess", "[SEP]"]);
    let text = "She played chess";
    let map = align(&tokens, text, TokenizerConvention::ContinuationMarked);
    assert_eq!(map.get(&3), Some(&1));
    let target = resolve(&tokens, text, 3, "won", TokenizerConvention::ContinuationMarked).unwrap();
    assert_eq!(target.modified_text, "She won chess");
}

#[test]
fn every_method_returns_layer_head_shape() {
    let t = uniform(3, 2, 4);
    for method in [VisualizationMethod::Raw, VisualizationMethod::Rollout, VisualizationMethod::Flow] {
        let layers = attribute(&t, method, &AttributionOptions::default()).unwrap();
        assert_eq!(layers.len(), 3, "{method}");
        assert!(layers.iter().all(|l| l.heads.len() == 2));
        let m = &layers[2].heads[1].attention;
        assert_eq!((m.rows(), m.cols()), (4, 4));
    }
}
