use crate::error::{PortalError, Result};
use crate::materials::types::Material;

use super::{FileKind, SlotAffordances, SlotState, SlotView, SLOT_COUNT};

/// Result of a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub assigned: usize,
    /// Materials past the last slot; not shown.
    pub overflow: usize,
}

/// In-memory mapping of slot index to material, fully replaced on reload.
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<Option<Material>>,
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; SLOT_COUNT],
        }
    }

    pub fn check_index(index: usize) -> Result<()> {
        if (1..=SLOT_COUNT).contains(&index) {
            Ok(())
        } else {
            Err(PortalError::SlotOutOfRange(index))
        }
    }

    /// Assign the first `SLOT_COUNT` materials to slots 1.. in received order
    /// and clear every other slot.
    pub fn reconcile(&mut self, materials: Vec<Material>) -> ReconcileOutcome {
        let total = materials.len();
        self.reset();
        for (slot, material) in self.slots.iter_mut().zip(materials) {
            *slot = Some(material);
        }

        let outcome = ReconcileOutcome {
            assigned: total.min(SLOT_COUNT),
            overflow: total.saturating_sub(SLOT_COUNT),
        };
        if outcome.overflow > 0 {
            log::warn!(
                "{} materials exceed the {} available slots and are hidden",
                outcome.overflow,
                SLOT_COUNT
            );
        }
        log::debug!("Slot materials assigned: {}", outcome.assigned);
        outcome
    }

    /// Clear every slot.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    /// Empty a slot after a confirmed delete, ahead of the next reload.
    pub fn mark_deleted(&mut self, index: usize) -> Result<Option<Material>> {
        Self::check_index(index)?;
        Ok(self.slots[index - 1].take())
    }

    pub fn material(&self, index: usize) -> Option<&Material> {
        if Self::check_index(index).is_err() {
            return None;
        }
        self.slots[index - 1].as_ref()
    }

    pub fn state(&self, index: usize) -> SlotState {
        match self.material(index) {
            Some(_) => SlotState::Occupied,
            None => SlotState::Empty,
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn view(&self, index: usize) -> Result<SlotView> {
        Self::check_index(index)?;
        Ok(render(index, self.slots[index - 1].as_ref()))
    }

    pub fn views(&self) -> Vec<SlotView> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, m)| render(i + 1, m.as_ref()))
            .collect()
    }
}

/// Label for an occupied slot: icon, name and size in MB.
pub fn material_label(name: &str, size_bytes: Option<f64>) -> String {
    if name.is_empty() {
        return "[No filename]".to_string();
    }
    let icon = FileKind::from_name(name).icon();
    match size_bytes.filter(|s| s.is_finite()) {
        Some(size) => format!("{} {} ({:.2} MB)", icon, name, size / (1024.0 * 1024.0)),
        None => format!("{} {}", icon, name),
    }
}

fn render(index: usize, material: Option<&Material>) -> SlotView {
    match material {
        Some(m) => SlotView {
            index,
            state: SlotState::Occupied,
            label: material_label(m.display_name(), m.size_bytes),
            status: String::new(),
            upload_text: "✓ Uploaded".to_string(),
            affordances: SlotAffordances::for_state(SlotState::Occupied),
        },
        None => SlotView {
            index,
            state: SlotState::Empty,
            label: format!("Material {}", index),
            status: "Empty".to_string(),
            upload_text: "📤 Upload".to_string(),
            affordances: SlotAffordances::for_state(SlotState::Empty),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn materials(n: usize) -> Vec<Material> {
        (1..=n)
            .map(|i| Material::new(&format!("met/201/{}.pdf", i), &format!("m{}.pdf", i)))
            .collect()
    }

    #[test]
    fn test_reconcile_then_clear() {
        let mut table = SlotTable::new();
        let a = Material::new("met/201/a.pdf", "A.pdf");
        let b = Material::new("met/201/b.pptx", "B.pptx");

        let outcome = table.reconcile(vec![a.clone(), b.clone()]);
        assert_eq!(outcome, ReconcileOutcome { assigned: 2, overflow: 0 });
        assert_eq!(table.material(1), Some(&a));
        assert_eq!(table.material(2), Some(&b));
        for i in 3..=SLOT_COUNT {
            assert_eq!(table.state(i), SlotState::Empty, "slot {}", i);
        }

        table.reconcile(Vec::new());
        assert_eq!(table.state(1), SlotState::Empty);
        assert_eq!(table.state(2), SlotState::Empty);
        assert_eq!(table.occupied_count(), 0);
    }

    #[test]
    fn test_reconcile_replaces_rather_than_merges() {
        let mut table = SlotTable::new();
        table.reconcile(materials(5));
        table.reconcile(materials(2));
        assert_eq!(table.occupied_count(), 2);
        assert_eq!(table.state(3), SlotState::Empty);
    }

    #[test]
    fn test_overflow_is_hidden() {
        let mut table = SlotTable::new();
        let outcome = table.reconcile(materials(SLOT_COUNT + 4));
        assert_eq!(outcome.assigned, SLOT_COUNT);
        assert_eq!(outcome.overflow, 4);
        assert_eq!(
            table.material(SLOT_COUNT).map(|m| m.display_name()),
            Some("m30.pdf")
        );
    }

    #[test]
    fn test_views_follow_occupancy() {
        let mut table = SlotTable::new();
        let mut m = Material::new("p", "Syllabus.docx");
        m.size_bytes = Some(1_572_864.0);
        table.reconcile(vec![m]);

        let occupied = table.view(1).unwrap();
        assert_eq!(occupied.label, "📝 Syllabus.docx (1.50 MB)");
        assert_eq!(occupied.status, "");
        assert_eq!(occupied.upload_text, "✓ Uploaded");
        assert!(!occupied.affordances.upload && occupied.affordances.delete);

        let empty = table.view(2).unwrap();
        assert_eq!(empty.label, "Material 2");
        assert_eq!(empty.status, "Empty");
        assert!(empty.affordances.upload && !empty.affordances.view);

        assert_eq!(table.views().len(), SLOT_COUNT);
    }

    #[test]
    fn test_mark_deleted_and_bounds() {
        let mut table = SlotTable::new();
        table.reconcile(materials(1));
        assert!(table.mark_deleted(1).unwrap().is_some());
        assert_eq!(table.state(1), SlotState::Empty);
        assert!(matches!(
            table.mark_deleted(0),
            Err(PortalError::SlotOutOfRange(0))
        ));
        assert!(table.view(SLOT_COUNT + 1).is_err());
        assert!(table.material(99).is_none());
    }

    #[test]
    fn test_label_without_name() {
        assert_eq!(material_label("", Some(10.0)), "[No filename]");
        assert_eq!(material_label("x.bin", None), "📁 x.bin");
    }
}
