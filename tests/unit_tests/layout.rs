use implicit_codegen::emit::SourceWriter;
use implicit_codegen::layout::{plan, ComponentLocation};
use implicit_codegen::proptest::{integration_variables, space_dimension};
use implicit_codegen::variable::IntegrationVariable;
use implicit_codegen::{DeclarationErrorKind, TensorRank};
use proptest::prelude::*;

fn scalar_and_stensor() -> Vec<IntegrationVariable> {
    vec![
        IntegrationVariable::new("p", TensorRank::Scalar, 1),
        IntegrationVariable::new("eel", TensorRank::SymmetricTensor, 1),
    ]
}

#[test]
fn layout_of_scalar_and_stensor_in_3d() {
    let layout = plan(&scalar_and_stensor(), 3).unwrap();
    assert_eq!(layout.entry("p").unwrap().range(), 0..1);
    assert_eq!(layout.entry("eel").unwrap().range(), 1..7);
    assert_eq!(layout.offset("eel"), Some(1));
    assert_eq!(layout.total_size(), 7);
    assert_eq!(layout.space_dimension().get(), 3);
}

#[test]
fn layout_block_sizes_depend_on_dimension() {
    let variables = vec![
        IntegrationVariable::new("eel", TensorRank::SymmetricTensor, 1),
        IntegrationVariable::new("g", TensorRank::Vector, 2),
    ];
    let sizes = |dim| {
        let layout = plan(&variables, dim).unwrap();
        (layout.entry("eel").unwrap().block_size, layout.entry("g").unwrap().block_size)
    };
    assert_eq!(sizes(1), (3, 2));
    assert_eq!(sizes(2), (4, 4));
    assert_eq!(sizes(3), (6, 6));
}

#[test]
fn layout_rejects_unsupported_dimensions() {
    for dim in [0, 4, 7] {
        assert_eq!(
            plan(&scalar_and_stensor(), dim),
            Err(DeclarationErrorKind::UnsupportedSpaceDimension(dim))
        );
    }
}

#[test]
fn layout_of_no_variables_is_empty() {
    let layout = plan(&[], 2).unwrap();
    assert_eq!(layout.total_size(), 0);
    assert!(layout.entries().is_empty());
    assert_eq!(layout.locate(0), None);
}

#[test]
fn layout_locates_components() {
    let variables = vec![
        IntegrationVariable::new("p", TensorRank::Scalar, 1),
        IntegrationVariable::new("g", TensorRank::Vector, 3),
    ];
    let layout = plan(&variables, 2).unwrap();
    assert_eq!(
        layout.locate(0),
        Some(ComponentLocation {
            variable: "p",
            array_index: 0,
            component: 0
        })
    );
    assert_eq!(
        layout.locate(4),
        Some(ComponentLocation {
            variable: "g",
            array_index: 1,
            component: 1
        })
    );
    assert_eq!(layout.locate(7), None);
}

#[test]
fn layout_emits_offsets() {
    let layout = plan(&scalar_and_stensor(), 3).unwrap();
    let mut w = SourceWriter::new().with_comments(false);
    layout.emit_offsets(&mut w).unwrap();
    assert_eq!(
        w.finish(),
        "static constexpr unsigned short p_offset = 0;\n\
         static constexpr unsigned short eel_offset = 1;\n\
         static constexpr unsigned short N = 7;\n"
    );
}

proptest! {
    #[test]
    fn layout_partitions_the_unknown_vector(variables in integration_variables(6, 4), dim in space_dimension()) {
        let layout = plan(&variables, dim).unwrap();

        let mut expected_offset = 0;
        for (entry, variable) in layout.entries().iter().zip(&variables) {
            prop_assert_eq!(entry.name(), variable.name());
            prop_assert_eq!(entry.offset, expected_offset);
            prop_assert_eq!(entry.block_size, entry.components * usize::from(variable.array_size()));
            expected_offset += entry.block_size;
        }
        prop_assert_eq!(layout.entries().len(), variables.len());
        prop_assert_eq!(layout.total_size(), expected_offset);

        for index in 0..layout.total_size() {
            let location = layout.locate(index).unwrap();
            let entry = layout.entry(location.variable).unwrap();
            prop_assert_eq!(entry.offset + location.array_index * entry.components + location.component, index);
        }
        prop_assert!(layout.locate(layout.total_size()).is_none());
    }
}
