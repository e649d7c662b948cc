// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/label.rs - COCO 类别标签
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use crate::model::WithLabel;

/// COCO 数据集类别名称
const COCO_CLASSES: [&str; 80] = [
  "Person",
  "Bicycle",
  "Car",
  "Motorcycle",
  "Airplane",
  "Bus",
  "Train",
  "Truck",
  "Boat",
  "Traffic Light",
  "Fire Hydrant",
  "Stop Sign",
  "Parking Meter",
  "Bench",
  "Bird",
  "Cat",
  "Dog",
  "Horse",
  "Sheep",
  "Cow",
  "Elephant",
  "Bear",
  "Zebra",
  "Giraffe",
  "Backpack",
  "Umbrella",
  "Handbag",
  "Tie",
  "Suitcase",
  "Frisbee",
  "Skis",
  "Snowboard",
  "Sports Ball",
  "Kite",
  "Baseball Bat",
  "Baseball Glove",
  "Skateboard",
  "Surfboard",
  "Tennis Racket",
  "Bottle",
  "Wine Glass",
  "Cup",
  "Fork",
  "Knife",
  "Spoon",
  "Bowl",
  "Banana",
  "Apple",
  "Sandwich",
  "Orange",
  "Broccoli",
  "Carrot",
  "Hot Dog",
  "Pizza",
  "Donut",
  "Cake",
  "Chair",
  "Couch",
  "Potted Plant",
  "Bed",
  "Dining Table",
  "Toilet",
  "TV",
  "Laptop",
  "Mouse",
  "Remote",
  "Keyboard",
  "Cell Phone",
  "Microwave",
  "Oven",
  "Toaster",
  "Sink",
  "Refrigerator",
  "Book",
  "Clock",
  "Vase",
  "Scissors",
  "Teddy Bear",
  "Hair Drier",
  "Toothbrush",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CocoLabel(u32);

impl WithLabel for CocoLabel {
  fn to_label_str(&self) -> String {
    COCO_CLASSES
      .get(self.0 as usize)
      .unwrap_or(&"Unknown")
      .to_string()
  }

  fn to_label_id(&self) -> u32 {
    self.0
  }

  fn from_label_id(id: u32) -> Self {
    CocoLabel(id)
  }
}

/// 标签显示文本：名称换行后跟百分比置信度
pub fn label_text(name: &str, confidence: f32) -> String {
  format!("{}\n{:.0}%", name, confidence * 100.0)
}
