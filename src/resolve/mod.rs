//! Resolve: link the ingested classes into a closed graph. Computes the
//! supertype closure, flattened field layouts, v-tables, interface-dispatch
//! tables, merged annotation defaults, reachability and class ids.
//!
//! Link failures are collected and reported together so users can fix an
//! input set in one pass.

mod reachability;

pub use reachability::mark_reachable;

use std::collections::{BTreeMap, BTreeSet};

use log::warn;

use crate::config::Config;
use crate::error::{LinkError, TranspileError};
use crate::model::{
    AnnotationValue, ClassKind, FieldSlot, ItableEntry, ProgramModel, VtableEntry,
};

/// Run every link step in dependency order. The program map is frozen for
/// reading once this returns Ok.
pub fn resolve(program: &mut ProgramModel, config: &Config) -> Result<(), TranspileError> {
    let mut errors = Vec::new();

    dedupe_emission_names(program);
    check_references(program, config, &mut errors);
    let order = match topological_order(program, &mut errors) {
        Some(order) => order,
        None => return Err(TranspileError::Link(errors)),
    };

    for name in &order {
        link_class(program, name, &mut errors);
    }
    for name in &order {
        build_itable(program, name, &mut errors);
    }

    merge_annotation_defaults(program);
    assign_class_ids(program);
    mark_reachable(program, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TranspileError::Link(errors))
    }
}

/// Within each class, emission names must be unique. A field redeclaring an
/// inherited name with a different type can collide once sanitization mixes
/// the owner in; keep both, disambiguate deterministically and warn.
fn dedupe_emission_names(program: &mut ProgramModel) {
    for class in program.classes.values_mut() {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for field in &mut class.fields {
            if !seen.insert(field.emission_name.clone()) {
                let mut n = 2;
                let mut candidate = format!("{}_{}", field.emission_name, n);
                while !seen.insert(candidate.clone()) {
                    n += 1;
                    candidate = format!("{}_{}", field.emission_name, n);
                }
                warn!(
                    "{}: field {} collides after sanitization, emitted as {}",
                    class.name, field.name, candidate
                );
                field.emission_name = candidate;
            }
        }
    }
}

/// Every named super and interface must exist in the program map unless the
/// runtime provides it.
fn check_references(program: &ProgramModel, config: &Config, errors: &mut Vec<LinkError>) {
    for class in program.classes.values() {
        let mut check = |name: &str| {
            if !program.classes.contains_key(name) && !config.is_runtime_provided(name) {
                errors.push(LinkError::MissingClass {
                    name: name.to_string(),
                    referenced_by: class.name.clone(),
                });
            }
        };
        if let Some(super_name) = &class.super_name {
            check(super_name);
        }
        for iface in &class.interface_names {
            check(iface);
        }
    }
}

/// Classes ordered supers-before-subs. Returns None when the supertype graph
/// has a cycle (recorded in `errors`), which makes every later step moot.
fn topological_order(program: &ProgramModel, errors: &mut Vec<LinkError>) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        program: &ProgramModel,
        name: &str,
        marks: &mut BTreeMap<String, Mark>,
        order: &mut Vec<String>,
        cycle: &mut bool,
    ) {
        match marks.get(name) {
            Some(Mark::Done) => return,
            Some(Mark::Visiting) => {
                *cycle = true;
                return;
            }
            None => {}
        }
        let Some(class) = program.classes.get(name) else {
            return;
        };
        marks.insert(name.to_string(), Mark::Visiting);
        if let Some(super_name) = &class.super_name {
            visit(program, super_name, marks, order, cycle);
        }
        for iface in &class.interface_names {
            visit(program, iface, marks, order, cycle);
        }
        marks.insert(name.to_string(), Mark::Done);
        order.push(name.to_string());
    }

    let mut marks = BTreeMap::new();
    let mut order = Vec::new();
    let mut found_cycle = false;
    for name in program.classes.keys() {
        let mut cycle = false;
        visit(program, name, &mut marks, &mut order, &mut cycle);
        if cycle {
            errors.push(LinkError::SupertypeCycle { name: name.clone() });
            found_cycle = true;
        }
    }
    if found_cycle {
        None
    } else {
        Some(order)
    }
}

/// Supertype closure, field layout and v-table for one class. Runs in
/// topological order so the super's link fields are already final.
fn link_class(program: &mut ProgramModel, name: &str, errors: &mut Vec<LinkError>) {
    let class = &program.classes[name];

    // Supertype closure: super chain plus all interfaces, transitively.
    let mut supertypes = BTreeSet::new();
    if let Some(super_name) = class.super_name.clone() {
        supertypes.insert(super_name.clone());
        if let Some(sup) = program.classes.get(&super_name) {
            supertypes.extend(sup.supertypes.iter().cloned());
        }
    }
    for iface in class.interface_names.clone() {
        supertypes.insert(iface.clone());
        if let Some(i) = program.classes.get(&iface) {
            supertypes.extend(i.supertypes.iter().cloned());
        }
    }

    // Flattened instance layout: super's slots first, then our own fields.
    let mut layout: Vec<FieldSlot> = class
        .super_name
        .as_ref()
        .and_then(|s| program.classes.get(s))
        .map(|s| s.layout.clone())
        .unwrap_or_default();
    if !class.is_interface() {
        for field in class.instance_fields() {
            layout.push(FieldSlot {
                owner: name.to_string(),
                emission_name: field.emission_name.clone(),
                ty: field.ty.clone(),
                slot: layout.len() as u32,
            });
        }
    }

    // V-table: copy the super's, overwrite overridden slots, append the rest.
    let mut vtable: Vec<VtableEntry> = class
        .super_name
        .as_ref()
        .and_then(|s| program.classes.get(s))
        .map(|s| s.vtable.clone())
        .unwrap_or_default();
    let mut vslots: Vec<(usize, i32)> = Vec::new();
    if !class.is_interface() {
        for (mi, method) in class.methods.iter().enumerate() {
            if !method.is_virtual() {
                vslots.push((mi, -1));
                continue;
            }
            let existing = vtable
                .iter()
                .position(|e| e.name == method.name && e.descriptor == method.descriptor);
            let slot = match existing {
                Some(slot) => {
                    let overridden = &vtable[slot];
                    let final_in_super = program
                        .classes
                        .get(&overridden.impl_class)
                        .and_then(|c| c.find_method(&method.name, &method.descriptor))
                        .is_some_and(|m| m.is_final());
                    if final_in_super {
                        errors.push(LinkError::FinalOverride {
                            class: name.to_string(),
                            name: method.name.clone(),
                            descriptor: method.descriptor.clone(),
                            declared_in: overridden.impl_class.clone(),
                        });
                    }
                    vtable[slot].impl_class = name.to_string();
                    slot
                }
                None => {
                    vtable.push(VtableEntry {
                        name: method.name.clone(),
                        descriptor: method.descriptor.clone(),
                        impl_class: name.to_string(),
                    });
                    vtable.len() - 1
                }
            };
            vslots.push((mi, slot as i32));
        }
    }

    let class = program.classes.get_mut(name).expect("linked class exists");
    class.supertypes = supertypes;
    class.layout = layout;
    class.vtable = vtable;
    for (mi, slot) in vslots {
        class.methods[mi].vslot = slot;
    }
}

/// Interface-dispatch table for one class: every interface method in the
/// closure mapped to its implementation. Concrete class methods win over
/// interface defaults; conflicting unrelated defaults are a link error.
fn build_itable(program: &mut ProgramModel, name: &str, errors: &mut Vec<LinkError>) {
    let class = &program.classes[name];
    if class.is_interface() {
        return;
    }

    let interfaces: Vec<String> = class
        .supertypes
        .iter()
        .filter(|s| {
            program
                .classes
                .get(*s)
                .map(|c| c.is_interface())
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    let mut itable = Vec::new();
    for iface_name in &interfaces {
        let iface = &program.classes[iface_name];
        for im in &iface.methods {
            if im.is_static() || im.is_class_initializer() {
                continue;
            }
            match find_implementation(program, name, &interfaces, &im.name, &im.descriptor) {
                Ok(Some(impl_class)) => itable.push(ItableEntry {
                    interface: iface_name.clone(),
                    name: im.name.clone(),
                    descriptor: im.descriptor.clone(),
                    impl_class,
                }),
                Ok(None) => {}
                Err((first, second)) => {
                    let conflict = LinkError::DefaultConflict {
                        class: name.to_string(),
                        name: im.name.clone(),
                        descriptor: im.descriptor.clone(),
                        first,
                        second,
                    };
                    if !errors.contains(&conflict) {
                        errors.push(conflict);
                    }
                }
            }
        }
    }
    itable.sort_by(|a, b| {
        (&a.interface, &a.name, &a.descriptor).cmp(&(&b.interface, &b.name, &b.descriptor))
    });
    itable.dedup();

    program.classes.get_mut(name).expect("class exists").itable = itable;
}

/// Implementation lookup for an interface method on `class_name`:
/// the class chain first, then the most specific interface default.
/// Err carries the two unrelated defaults of a diamond conflict.
fn find_implementation(
    program: &ProgramModel,
    class_name: &str,
    interfaces: &[String],
    name: &str,
    descriptor: &str,
) -> Result<Option<String>, (String, String)> {
    let mut cursor = Some(class_name.to_string());
    while let Some(current) = cursor {
        let Some(class) = program.classes.get(&current) else {
            break;
        };
        if let Some(m) = class.find_method(name, descriptor) {
            if !m.is_abstract() {
                return Ok(Some(current));
            }
        }
        cursor = class.super_name.clone();
    }

    // Default methods: keep only the most specific declaring interfaces.
    let mut candidates: Vec<String> = interfaces
        .iter()
        .filter(|i| {
            program
                .classes
                .get(*i)
                .and_then(|c| c.find_method(name, descriptor))
                .is_some_and(|m| !m.is_abstract())
        })
        .cloned()
        .collect();
    candidates.retain(|c| {
        !interfaces.iter().any(|other| {
            other != c
                && program
                    .classes
                    .get(other)
                    .and_then(|o| o.find_method(name, descriptor))
                    .is_some_and(|m| !m.is_abstract())
                && program.is_subtype(other, c)
        })
    });

    match candidates.len() {
        0 => Ok(None),
        1 => Ok(Some(candidates.remove(0))),
        _ => Err((candidates.remove(0), candidates.remove(0))),
    }
}

/// Fill annotation occurrences with the declared element defaults they omit.
fn merge_annotation_defaults(program: &mut ProgramModel) {
    let mut defaults: BTreeMap<String, Vec<(String, AnnotationValue)>> = BTreeMap::new();
    for class in program.classes.values() {
        if class.kind != ClassKind::Annotation {
            continue;
        }
        let entries: Vec<(String, AnnotationValue)> = class
            .methods
            .iter()
            .filter_map(|m| m.annotation_default.clone().map(|d| (m.name.clone(), d)))
            .collect();
        if !entries.is_empty() {
            defaults.insert(class.name.clone(), entries);
        }
    }
    if defaults.is_empty() {
        return;
    }

    for class in program.classes.values_mut() {
        let apply = |annotations: &mut Vec<crate::model::AnnotationModel>| {
            for ann in annotations {
                if let Some(entries) = defaults.get(&ann.type_name) {
                    for (element, value) in entries {
                        ann.values
                            .entry(element.clone())
                            .or_insert_with(|| value.clone());
                    }
                }
            }
        };
        apply(&mut class.annotations);
        for field in &mut class.fields {
            apply(&mut field.annotations);
        }
        for method in &mut class.methods {
            apply(&mut method.annotations);
        }
    }
}

/// Dense ids in lexicographic name order; used by instance-of/checkcast
/// helpers and interface dispatch.
fn assign_class_ids(program: &mut ProgramModel) {
    for (id, class) in program.classes.values_mut().enumerate() {
        class.class_id = id as u32;
    }
}
