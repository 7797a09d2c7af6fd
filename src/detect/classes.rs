//! COCO-80 class table shared by the detection client and the policy loader.

pub const COCO80_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Look up the class index for a label. Case-insensitive; `_` matches a space
/// so config files can write `traffic_light`.
pub fn class_index(label: &str) -> Option<u32> {
    let wanted = label.trim().to_lowercase().replace('_', " ");
    COCO80_CLASSES
        .iter()
        .position(|name| *name == wanted)
        .map(|idx| idx as u32)
}

pub fn class_name(idx: u32) -> Option<&'static str> {
    COCO80_CLASSES.get(idx as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_and_separator_insensitive() {
        assert_eq!(class_index("person"), Some(0));
        assert_eq!(class_index("Car"), Some(2));
        assert_eq!(class_index("traffic_light"), Some(9));
        assert_eq!(class_index("unicorn"), None);
    }

    #[test]
    fn name_round_trips_index() {
        assert_eq!(class_name(16), Some("dog"));
        assert_eq!(class_name(80), None);
    }
}
